//! The store commands exposed to the host.

use crate::registry::{Command, Invocation, Registry, handler};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use kvlink_client::ClientError;
use kvlink_core::{CommandError, Envelope, Route, Source, codec};
use serde_json::Value;

const PATH: &[Source] = &[Source::Path];
const QUERY: &[Source] = &[Source::Query];
const BODY: &[Source] = &[Source::Body];

const MESSAGE: &str = "ui.message";
const INTEGER: &str = "number[numbers.integer]";

/// Build the full command table.
pub fn table() -> Registry {
    let mut registry = Registry::new();

    registry.register(
        Command::new("connect", Route::get("/connect"), handler(connect))
            .reads(QUERY)
            .describe(
                "Connect command",
                MESSAGE,
                ["connect (host string) (port numbers.integer)", "CONNECT (host string) (port numbers.integer)"],
            ),
    );
    registry.register(
        Command::new("get", Route::get("/get/{key}"), handler(get))
            .reads(PATH)
            .describe("GET command", "any", ["get (key string)", "GET (key string)"]),
    );
    registry.register(
        Command::new("set", Route::post("/set"), handler(set))
            .reads(BODY)
            .describe(
                "SET command",
                MESSAGE,
                ["set (key string) to (value any)", "SET (key string) to (value any)"],
            ),
    );
    registry.register(
        Command::new("append", Route::post("/append"), handler(append))
            .reads(BODY)
            .describe(
                "APPEND command",
                MESSAGE,
                [
                    "append (key string) (value string)",
                    "APPEND (key string) (value string)",
                    "append (value string) to (key string)",
                    "APPEND (value string) to (key string)",
                ],
            ),
    );
    registry.register(
        Command::new("dbsize", Route::get("/dbsize"), handler(dbsize))
            .describe("DBSIZE command", INTEGER, ["dbsize", "DBSIZE"]),
    );
    registry.register(
        Command::new("decrement", Route::post("/decrement"), handler(decrement))
            .reads(BODY)
            .describe("DECR command", MESSAGE, ["decr (key string)", "DECR (key string)"]),
    );
    registry.register(
        Command::new("decrementBy", Route::post("/decrementby"), handler(decrement_by))
            .reads(BODY)
            .describe(
                "DECRBY command",
                MESSAGE,
                [
                    "decrby (key string) (by number)",
                    "DECRBY (key string) (by number)",
                    "decr (key string) by (by number)",
                    "DECR (key string) by (by number)",
                ],
            ),
    );
    registry.register(
        Command::new("del", Route::delete("/delete"), handler(del))
            .reads(BODY)
            .describe(
                "DEL command",
                MESSAGE,
                [
                    "del (key string)",
                    "DEL (key string)",
                    "del (keys list<string>)",
                    "DEL (keys list<string>)",
                ],
            ),
    );
    registry.register(
        Command::new("dump", Route::get("/dump/{key}"), handler(dump))
            .reads(PATH)
            .describe("DUMP command", "string", ["dump (key string)", "DUMP (key string)"]),
    );
    registry.register(
        Command::new("exists", Route::get("/exists"), handler(exists))
            .reads(QUERY)
            .describe(
                "EXISTS command",
                INTEGER,
                [
                    "exists (key string)",
                    "EXISTS (key string)",
                    "exists (keys list<string>)",
                    "EXISTS (keys list<string>)",
                ],
            ),
    );
    registry.register(
        Command::new("type", Route::get("/type/{key}"), handler(key_type))
            .reads(PATH)
            .describe("type command", "any", ["type (key string)", "TYPE (key string)"]),
    );
    registry.register(
        Command::new("renamenx", Route::post("/renamenx"), handler(renamenx))
            .reads(BODY)
            .describe(
                "renamenx command",
                INTEGER,
                ["renamenx (key string) (newKey string)", "RENAMENX (key string) (newKey string)"],
            ),
    );

    registry
}

/// Render a backend outcome: errors become failures, values go through `ok`.
fn reply<T, F>(outcome: kvlink_client::Result<T>, ok: F) -> Result<Envelope, CommandError>
where
    F: FnOnce(T) -> Result<Envelope, CommandError>,
{
    match outcome {
        Ok(value) => ok(value),
        Err(ClientError::Server(message)) => Err(CommandError::Backend(message)),
        Err(other) => Err(CommandError::Backend(other.to_string())),
    }
}

async fn connect(inv: Invocation) -> Result<Envelope, CommandError> {
    let params = inv.params();
    let host = params.require("host")?;
    let port = params.integer("port")?;
    let port = u16::try_from(port)
        .map_err(|_| CommandError::invalid("port", format!("{port} is not a valid port")))?;

    inv.connection().connect(&host, port).await?;
    Ok(Envelope::success(format!("connected to {host}:{port}")))
}

async fn get(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let key = inv.params().require("key")?;

    reply(store.get(&key).await, |raw| {
        // A stored `null` reads the same as a missing key.
        match raw.map(|raw| codec::decode(&raw)) {
            None | Some(Value::Null) => Err(CommandError::KeyNotFound),
            Some(value) => Ok(Envelope::success(value)),
        }
    })
}

async fn set(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let params = inv.params();
    let key = params.require("key")?;
    let value = params.require_value("value")?;

    reply(store.set(&key, &codec::encode(&value)).await, |()| {
        Ok(Envelope::success(format!(
            "successfully set \"{key}\" to {}",
            codec::encode_with(&value)
        )))
    })
}

async fn append(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let params = inv.params();
    let key = params.require("key")?;
    let value = codec::encode(&params.require_value("value")?);

    reply(store.append(&key, &value).await, |_| {
        Ok(Envelope::success(format!("successfully appended \"{value}\" to {key}")))
    })
}

async fn dbsize(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    reply(store.dbsize().await, |size| Ok(Envelope::success(size)))
}

async fn decrement(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let key = inv.params().require("key")?;

    reply(store.decr(&key).await, |_| {
        Ok(Envelope::success(format!("successfully decremented \"{key}\"")))
    })
}

async fn decrement_by(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let params = inv.params();
    let key = params.require("key")?;
    let by = params.integer("by")?;

    reply(store.decrby(&key, by).await, |_| {
        Ok(Envelope::success(format!("successfully decremented \"{key}\" by {by}")))
    })
}

async fn del(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let keys = inv.params().list("key", "keys")?;

    reply(store.del(&keys).await, |removed| {
        Ok(Envelope::success(format!("removed {removed} keys")))
    })
}

async fn dump(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let key = inv.params().require("key")?;

    reply(store.dump(&key).await, |payload| {
        let payload = payload.ok_or(CommandError::KeyNotFound)?;
        Ok(Envelope::success(BASE64.encode(payload)))
    })
}

async fn exists(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let keys = inv.params().list("key", "keys")?;
    reply(store.exists(&keys).await, |count| Ok(Envelope::success(count)))
}

async fn key_type(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let key = inv.params().require("key")?;
    reply(store.key_type(&key).await, |name| Ok(Envelope::success(name)))
}

async fn renamenx(inv: Invocation) -> Result<Envelope, CommandError> {
    let store = inv.store().await?;
    let params = inv.params();
    let key = params.require("key")?;
    let new_key = params.require("newKey")?;

    reply(store.renamenx(&key, &new_key).await, |renamed| {
        Ok(Envelope::success(i64::from(renamed)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::dispatch::Dispatcher;
    use kvlink_client::{MemoryConnector, MemoryStore, Store};
    use kvlink_core::{Method, Request};
    use serde_json::json;
    use std::sync::Arc;

    async fn connected() -> (Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let connection = Arc::new(ConnectionManager::new(Arc::new(MemoryConnector::new(store.clone()))));
        connection.connect("localhost", 6379).await.unwrap();
        (Dispatcher::new(connection, Arc::new(table())), store)
    }

    #[test]
    fn table_describes_every_command() {
        let registry = table();
        assert_eq!(registry.len(), 12);

        let del = registry.get("del").unwrap();
        assert_eq!(del.route.method, Method::Delete);
        assert_eq!(del.descriptor.handler.endpoint, "delete");
        assert_eq!(del.descriptor.title, "DEL command");

        let decrement_by = registry.get("decrementBy").unwrap();
        assert_eq!(decrement_by.descriptor.handler.endpoint, "decrementby");
        assert!(decrement_by.descriptor.syntax.contains(&"decr (key string) by (by number)".to_string()));

        assert_eq!(registry.get("exists").unwrap().descriptor.returns, INTEGER);
        assert_eq!(registry.get("get").unwrap().descriptor.handler.endpoint, "get/{key}");
    }

    #[tokio::test]
    async fn set_then_get_keeps_structure() {
        let (dispatcher, _) = connected().await;
        let set = dispatcher
            .dispatch("set", Request::new().with_body("key", "x").with_body("value", json!({"a": 1})))
            .await;
        assert_eq!(set.value(), Some(&json!("successfully set \"x\" to {\"a\":1}")));

        let get = dispatcher.dispatch("get", Request::new().with_path("key", "x")).await;
        assert_eq!(get.value(), Some(&json!({"a": 1})));
        assert_eq!(get.to_wire().value, Some(json!("{\"a\":1}")));
    }

    #[tokio::test]
    async fn get_missing_key() {
        let (dispatcher, _) = connected().await;
        let get = dispatcher.dispatch("get", Request::new().with_path("key", "nope")).await;
        assert_eq!(get.error(), Some("key not found"));
        assert_eq!(get.status_code(), 200);
    }

    #[tokio::test]
    async fn stored_null_reads_as_missing() {
        let (dispatcher, store) = connected().await;
        store.set("empty", "null").await.unwrap();
        let get = dispatcher.dispatch("get", Request::new().with_path("key", "empty")).await;
        assert_eq!(get.error(), Some("key not found"));

        store.set("word", "\"null\"").await.unwrap();
        let get = dispatcher.dispatch("get", Request::new().with_path("key", "word")).await;
        assert_eq!(get.value(), Some(&json!("null")));
    }

    #[tokio::test]
    async fn counters() {
        let (dispatcher, store) = connected().await;
        let decr = dispatcher.dispatch("decrement", Request::new().with_body("key", "n")).await;
        assert_eq!(decr.value(), Some(&json!("successfully decremented \"n\"")));

        let by = dispatcher
            .dispatch("decrementBy", Request::new().with_body("key", "n").with_body("by", "4"))
            .await;
        assert_eq!(by.value(), Some(&json!("successfully decremented \"n\" by 4")));
        assert_eq!(store.get("n").await.unwrap().as_deref(), Some("-5"));

        let before = store.operation_count();
        let missing = dispatcher.dispatch("decrementBy", Request::new().with_body("key", "n")).await;
        assert_eq!(missing.error(), Some("expecting 'by' in body"));
        assert_eq!(missing.status_code(), 400);
        assert_eq!(store.operation_count(), before);

        dispatcher
            .dispatch("set", Request::new().with_body("key", "name").with_body("value", "kv"))
            .await;
        let bad = dispatcher.dispatch("decrement", Request::new().with_body("key", "name")).await;
        assert_eq!(bad.error(), Some("ERR value is not an integer or out of range"));
    }

    #[tokio::test]
    async fn key_lists() {
        let (dispatcher, _) = connected().await;
        for key in ["a", "b"] {
            dispatcher
                .dispatch("set", Request::new().with_body("key", key).with_body("value", 1))
                .await;
        }

        let exists = dispatcher.dispatch("exists", Request::new().with_query("keys", "a,b,c")).await;
        assert_eq!(exists.value(), Some(&json!(2)));

        let single = dispatcher.dispatch("exists", Request::new().with_query("key", "a")).await;
        assert_eq!(single.value(), Some(&json!(1)));

        let none = dispatcher.dispatch("exists", Request::new()).await;
        assert_eq!(none.error(), Some("expecting 'key' or 'keys' in query"));

        let del = dispatcher
            .dispatch("del", Request::new().with_body("keys", json!(["a", "b", "c"])))
            .await;
        assert_eq!(del.value(), Some(&json!("removed 2 keys")));

        let size = dispatcher.dispatch("dbsize", Request::new()).await;
        assert_eq!(size.value(), Some(&json!(0)));
    }

    #[tokio::test]
    async fn append_dump_type_renamenx() {
        let (dispatcher, _) = connected().await;
        let append = dispatcher
            .dispatch("append", Request::new().with_body("key", "s").with_body("value", "ab"))
            .await;
        assert_eq!(append.value(), Some(&json!("successfully appended \"ab\" to s")));

        let dump = dispatcher.dispatch("dump", Request::new().with_path("key", "s")).await;
        assert_eq!(dump.value(), Some(&json!(BASE64.encode([0, b'a', b'b']))));

        let missing = dispatcher.dispatch("dump", Request::new().with_path("key", "zz")).await;
        assert_eq!(missing.error(), Some("key not found"));

        let kind = dispatcher.dispatch("type", Request::new().with_path("key", "s")).await;
        assert_eq!(kind.value(), Some(&json!("string")));
        let kind = dispatcher.dispatch("type", Request::new().with_path("key", "zz")).await;
        assert_eq!(kind.value(), Some(&json!("none")));

        let renamed = dispatcher
            .dispatch("renamenx", Request::new().with_body("key", "s").with_body("newKey", "t"))
            .await;
        assert_eq!(renamed.value(), Some(&json!(1)));
        dispatcher
            .dispatch("set", Request::new().with_body("key", "u").with_body("value", "x"))
            .await;
        let blocked = dispatcher
            .dispatch("renamenx", Request::new().with_body("key", "t").with_body("newKey", "u"))
            .await;
        assert_eq!(blocked.value(), Some(&json!(0)));
    }

    #[tokio::test]
    async fn commands_need_a_connection() {
        let store = Arc::new(MemoryStore::new());
        let connection = Arc::new(ConnectionManager::new(Arc::new(MemoryConnector::new(store.clone()))));
        let dispatcher = Dispatcher::new(connection, Arc::new(table()));

        for name in ["get", "dbsize", "set", "del"] {
            let envelope = dispatcher.dispatch(name, Request::new()).await;
            assert_eq!(envelope.error(), Some("not connected"), "{name}");
        }
        assert_eq!(store.operation_count(), 0);

        let connect = dispatcher
            .dispatch("connect", Request::new().with_query("host", "localhost").with_query("port", "6379"))
            .await;
        assert_eq!(connect.value(), Some(&json!("connected to localhost:6379")));

        let again = dispatcher
            .dispatch("connect", Request::new().with_query("host", "localhost").with_query("port", "6379"))
            .await;
        assert_eq!(again.error(), Some("already connected"));

        let size = dispatcher.dispatch("dbsize", Request::new()).await;
        assert_eq!(size.value(), Some(&json!(0)));
    }

    #[tokio::test]
    async fn connect_validates_port() {
        let connection = Arc::new(ConnectionManager::new(Arc::new(MemoryConnector::unreachable())));
        let dispatcher = Dispatcher::new(connection, Arc::new(table()));

        let bad = dispatcher
            .dispatch("connect", Request::new().with_query("host", "h").with_query("port", "70000"))
            .await;
        assert_eq!(bad.status_code(), 400);

        let refused = dispatcher
            .dispatch("connect", Request::new().with_query("host", "h").with_query("port", "1"))
            .await;
        assert_eq!(refused.error(), Some("connect ECONNREFUSED h:1"));
    }
}
