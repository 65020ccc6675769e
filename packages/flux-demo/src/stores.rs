//! Stores for the todo demo.
//!
//! `todos` owns the list, `notifications` waits for `todos` and writes a
//! message per added item, `stats` waits for both and keeps counters.

use anyhow::{bail, Result};
use flux_dispatch::{Action, DispatchReport, Dispatcher, HandlerContext, Store, StoreHandle};
use serde::Serialize;
use serde_json::{json, Value};

pub const ADD_TODO: &str = "ADD_TODO";
pub const CLEAR_TODOS: &str = "CLEAR_TODOS";

#[derive(Debug, Default, Clone, Serialize)]
pub struct Todos {
    pub items: Vec<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Notifications {
    pub messages: Vec<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub added: usize,
    pub cleared: usize,
    pub notifications_seen: usize,
}

pub fn todo_store(max_todos: usize) -> Store<Todos> {
    Store::new(Todos::default())
        .on(ADD_TODO, move |todos: &mut Todos, ctx: &mut HandlerContext<'_>| {
            let Some(text) = ctx.payload().get("text").and_then(Value::as_str) else {
                bail!("ADD_TODO payload needs a \"text\" string");
            };
            if todos.items.len() >= max_todos {
                bail!("todo list is full ({max_todos} items)");
            }
            todos.items.push(text.to_string());
            ctx.emit_change();
            Ok(())
        })
        .on(CLEAR_TODOS, |todos: &mut Todos, ctx| {
            if !todos.items.is_empty() {
                todos.items.clear();
                ctx.emit_change();
            }
            Ok(())
        })
}

pub fn notification_store() -> Store<Notifications> {
    Store::new(Notifications::default()).on(
        ADD_TODO,
        |notes: &mut Notifications, ctx: &mut HandlerContext<'_>| {
            let total = ctx.wait_for_state::<Todos>("todos")?.items.len();
            let text = ctx.payload()["text"].as_str().unwrap_or_default();
            notes.messages.push(format!("added {text:?} ({total} total)"));
            ctx.emit_change();
            Ok(())
        },
    )
}

pub fn stats_store() -> Store<Stats> {
    Store::new(Stats::default())
        .on(ADD_TODO, |stats: &mut Stats, ctx| {
            let seen = ctx.wait_for(&["todos", "notifications"], |stores| {
                stores[1]
                    .state::<Notifications>()
                    .map(|notes| notes.messages.len())
            })??;
            stats.added += 1;
            stats.notifications_seen = seen;
            Ok(())
        })
        .on(CLEAR_TODOS, |stats: &mut Stats, ctx| {
            ctx.wait_for(&["todos"], |_| ())?;
            stats.cleared += 1;
            Ok(())
        })
}

/// The three demo stores behind one dispatcher.
#[derive(Debug)]
pub struct TodoApp {
    dispatcher: Dispatcher,
    pub todos: StoreHandle<Todos>,
    pub notifications: StoreHandle<Notifications>,
    pub stats: StoreHandle<Stats>,
}

impl TodoApp {
    /// Register the demo stores. With `notifications_first`, the dependent
    /// stores are registered before `todos`, which `wait_for` makes harmless.
    pub fn new(max_todos: usize, notifications_first: bool) -> Result<Self> {
        let dispatcher: Dispatcher = Dispatcher::new();

        let (todos, notifications, stats) = if notifications_first {
            let stats = dispatcher.register("stats", stats_store())?;
            let notifications = dispatcher.register("notifications", notification_store())?;
            let todos = dispatcher.register("todos", todo_store(max_todos))?;
            (todos, notifications, stats)
        } else {
            let todos = dispatcher.register("todos", todo_store(max_todos))?;
            let notifications = dispatcher.register("notifications", notification_store())?;
            let stats = dispatcher.register("stats", stats_store())?;
            (todos, notifications, stats)
        };

        Ok(Self {
            dispatcher,
            todos,
            notifications,
            stats,
        })
    }

    pub fn add(&self, text: &str) -> Result<DispatchReport> {
        Ok(self
            .dispatcher
            .dispatch(Action::new(ADD_TODO, json!({ "text": text })))?)
    }

    pub fn clear(&self) -> Result<DispatchReport> {
        Ok(self.dispatcher.dispatch(Action::new(CLEAR_TODOS, Value::Null))?)
    }

    pub fn store_names(&self) -> Vec<String> {
        self.dispatcher.store_names()
    }
}

/// Two stores that wait on each other for `PING`.
pub fn ping_pong() -> Result<Dispatcher> {
    let dispatcher: Dispatcher = Dispatcher::new();
    for (name, other) in [("ping", "pong"), ("pong", "ping")] {
        dispatcher.register(
            name,
            Store::new(()).on("PING", move |_: &mut (), ctx| {
                ctx.wait_for(&[other], |_| ())?;
                Ok(())
            }),
        )?;
    }
    Ok(dispatcher)
}
