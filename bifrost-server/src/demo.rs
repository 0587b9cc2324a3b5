//! Demo functions served by the `bifrost-server` binary

use crate::api::auth::{allow_any, bearer_guard, deny_with, JwtAuth};
use bifrost::{FnError, Registry, Subscription};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// Auth key the demo functions are guarded under
pub const WEB: &str = "web";

#[derive(Debug, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default)]
    pub age: u32,
}

#[derive(Debug, Deserialize)]
pub struct Num {
    pub n: i64,
}

#[derive(Debug, Deserialize)]
pub struct Ticker {
    #[serde(default = "default_every_ms")]
    pub every_ms: u64,
    pub count: Option<u64>,
}

fn default_every_ms() -> u64 {
    1000
}

async fn hello1(p: Person) -> Result<String, FnError> {
    Ok(format!("Hello 1 {}!!!", p.name))
}

async fn hello2(p: Person) -> Result<String, FnError> {
    Ok(format!("Hello 2 {}. You are {} years old", p.name, p.age))
}

async fn hello3(p: Person) -> Result<String, FnError> {
    Ok(format!("Hello 3 {}. You are {} years old", p.name, p.age))
}

/// Channel that counts up once per tick until disposed or `count` is reached
pub fn ticker(p: Ticker) -> Subscription<u64> {
    let channel = Subscription::detached();

    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            channel.next_error(FnError::new(format!("ticker needs a tokio runtime: {}", e)));
            return channel;
        }
    };

    let feed = channel.clone();
    handle.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(p.every_ms.max(1)));
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            if feed.is_disposed() || p.count.is_some_and(|count| tick >= count) {
                debug!("Ticker stopped after {} ticks", tick);
                break;
            }
            tick += 1;
            feed.next_data(tick);
        }
    });

    channel
}

/// The acme demo registry.
///
/// Over HTTP `hello1` always answers 401 and `hello2` needs a bearer token;
/// everything else is open. `ticker` returns a channel and so can only be used
/// in-process.
pub fn acme_registry(auth: Arc<JwtAuth>) -> bifrost::Result<Registry> {
    Registry::new()
        .function("hello1", hello1)
        .function("hello2", hello2)
        .function("hello3", hello3)
        .sync_function("double", |p: Num| Ok(p.n * 2))
        .channel("ticker", ticker)
        .guard("hello1", WEB, deny_with(401, "Need access"))?
        .guard("hello2", WEB, bearer_guard(auth))?
        .guard("hello3", WEB, allow_any)?
        .guard("double", WEB, allow_any)?
        .guard("ticker", WEB, allow_any)
}
