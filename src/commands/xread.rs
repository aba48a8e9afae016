use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, oneshot},
    time::{Instant, timeout_at},
};

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{encode_entries, parse_read_baseline},
    },
    key_value_store::{DataType, KeyValueStore, StreamId},
    resp::RespValue,
    state::State,
};

struct XreadArguments {
    /// Present when BLOCK was given; 0 means wait forever.
    block_ms: Option<u64>,
    keys: Vec<String>,
    raw_ids: Vec<String>,
}

impl XreadArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let mut iter = arguments.into_iter().peekable();
        let mut block_ms = None;

        if iter
            .peek()
            .is_some_and(|token| token.eq_ignore_ascii_case("BLOCK"))
        {
            iter.next();

            let raw = iter.next().ok_or(CommandError::SyntaxError)?;
            block_ms = Some(raw.parse::<u64>().map_err(|_| CommandError::NotAnInteger)?);
        }

        match iter.next() {
            Some(token) if token.eq_ignore_ascii_case("STREAMS") => (),
            _ => return Err(CommandError::SyntaxError),
        }

        let rest: Vec<String> = iter.collect();

        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(CommandError::SyntaxError);
        }

        let (keys, raw_ids) = rest.split_at(rest.len() / 2);

        Ok(Self {
            block_ms,
            keys: keys.to_vec(),
            raw_ids: raw_ids.to_vec(),
        })
    }
}

/// Handles the Redis XREAD command, optionally blocking.
///
/// Baselines are fixed once at call time; `$` resolves to the stream's
/// current last id, so only entries appended after the call match.
/// A blocked XREAD re-evaluates against those original baselines when
/// it is woken, which is what lets a fresh XADD satisfy it.
pub async fn xread(
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xread_arguments = XreadArguments::parse(arguments)?;

    let baselines = resolve_baselines(store, &xread_arguments).await?;

    let deadline = match xread_arguments.block_ms {
        Some(block_ms) if block_ms > 0 => {
            Some(Instant::now() + Duration::from_millis(block_ms))
        }
        _ => None,
    };

    loop {
        if let Some(response) =
            collect_new_entries(store, &xread_arguments.keys, &baselines).await?
        {
            return Ok(CommandResult::Response(response));
        }

        if xread_arguments.block_ms.is_none() {
            return Ok(CommandResult::Response(RespValue::NullArray.encode()));
        }

        let (waiter_id, receiver) = {
            let mut state_guard = state.lock().await;
            state_guard.register_stream_waiter(&xread_arguments.keys)
        };

        // Close the append-before-register window.
        if let Some(response) =
            collect_new_entries(store, &xread_arguments.keys, &baselines).await?
        {
            let mut state_guard = state.lock().await;
            state_guard.remove_waiter(waiter_id);

            return Ok(CommandResult::Response(response));
        }

        let woken = wait_for_signal(receiver, deadline).await;

        {
            let mut state_guard = state.lock().await;
            state_guard.remove_waiter(waiter_id);
        }

        if !woken {
            return Ok(CommandResult::Response(RespValue::NullArray.encode()));
        }
    }
}

async fn resolve_baselines(
    store: &Arc<Mutex<KeyValueStore>>,
    arguments: &XreadArguments,
) -> Result<Vec<StreamId>, CommandError> {
    let mut store_guard = store.lock().await;
    let mut baselines = Vec::with_capacity(arguments.keys.len());

    for (key, raw_id) in arguments.keys.iter().zip(&arguments.raw_ids) {
        let last_id = match store_guard.get(key) {
            Some(value) => {
                let DataType::Stream(ref stream) = value.data else {
                    return Err(CommandError::WrongType);
                };

                stream.last_id()
            }
            None => StreamId::ZERO,
        };

        let baseline = match parse_read_baseline(raw_id)? {
            Some(explicit) => explicit,
            None => last_id,
        };

        baselines.push(baseline);
    }

    Ok(baselines)
}

/// Entries strictly above each baseline, encoded as
/// `[[key, [entry, ...]], ...]` with empty keys omitted. `None` when no
/// stream has anything new.
async fn collect_new_entries(
    store: &Arc<Mutex<KeyValueStore>>,
    keys: &[String],
    baselines: &[StreamId],
) -> Result<Option<String>, CommandError> {
    let mut store_guard = store.lock().await;
    let mut per_key = Vec::new();

    for (key, baseline) in keys.iter().zip(baselines) {
        let Some(value) = store_guard.get(key) else {
            continue;
        };

        let DataType::Stream(ref stream) = value.data else {
            return Err(CommandError::WrongType);
        };

        let entries = stream.entries_after(*baseline);

        if !entries.is_empty() {
            per_key.push(RespValue::Array(vec![
                RespValue::BulkString(key.clone()),
                encode_entries(entries),
            ]));
        }
    }

    if per_key.is_empty() {
        return Ok(None);
    }

    Ok(Some(RespValue::Array(per_key).encode()))
}

async fn wait_for_signal(receiver: oneshot::Receiver<()>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => receiver.await.is_ok(),
        Some(deadline) => match timeout_at(deadline, receiver).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_value_store::{Stream, Value};

    async fn seed_stream(store: &Arc<Mutex<KeyValueStore>>, key: &str, ids: &[(u64, u64)]) {
        let mut stream = Stream::new();

        for (ms, seq) in ids {
            stream.append(
                StreamId::new(*ms, *seq),
                vec![("k".to_string(), "v".to_string())],
            );
        }

        let mut store_guard = store.lock().await;
        store_guard.insert(
            key.to_string(),
            Value {
                data: DataType::Stream(stream),
                expiration: None,
            },
        );
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_parse_arguments() {
        let parsed = XreadArguments::parse(args(&["STREAMS", "a", "b", "0", "5-1"])).unwrap();
        assert_eq!(parsed.block_ms, None);
        assert_eq!(parsed.keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(parsed.raw_ids, vec!["0".to_string(), "5-1".to_string()]);

        let parsed = XreadArguments::parse(args(&["BLOCK", "100", "STREAMS", "a", "$"])).unwrap();
        assert_eq!(parsed.block_ms, Some(100));

        let test_cases = vec![
            args(&["a", "0"]),
            args(&["STREAMS", "a"]),
            args(&["STREAMS", "a", "b", "0"]),
            args(&["BLOCK", "STREAMS", "a", "0"]),
        ];

        for arguments in test_cases {
            assert!(
                XreadArguments::parse(arguments.clone()).is_err(),
                "{:?} should fail",
                arguments
            );
        }
    }

    #[tokio::test]
    async fn test_xread_returns_entries_after_baseline() {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));
        seed_stream(&store, "s", &[(1, 0), (2, 0)]).await;

        let result = xread(&store, &state, args(&["STREAMS", "s", "1-0"]))
            .await
            .unwrap();

        match result {
            CommandResult::Response(response) => {
                assert!(response.contains("2-0"), "got {:?}", response);
                assert!(!response.contains("1-0\r\n*2"), "got {:?}", response);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_xread_without_block_and_no_data_is_null() {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));
        seed_stream(&store, "s", &[(1, 0)]).await;

        let result = xread(&store, &state, args(&["STREAMS", "s", "1-0"]))
            .await
            .unwrap();

        assert_eq!(result, CommandResult::Response("*-1\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_xread_block_timeout_returns_null() {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));

        let result = xread(
            &store,
            &state,
            args(&["BLOCK", "50", "STREAMS", "s", "$"]),
        )
        .await
        .unwrap();

        assert_eq!(result, CommandResult::Response("*-1\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_xread_block_wakes_on_xadd() {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));
        seed_stream(&store, "s", &[(1, 0)]).await;

        let store_clone = Arc::clone(&store);
        let state_clone = Arc::clone(&state);

        let reader = tokio::spawn(async move {
            xread(
                &store_clone,
                &state_clone,
                args(&["BLOCK", "0", "STREAMS", "s", "$"]),
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let mut store_guard = store.lock().await;
            let Some(value) = store_guard.get_mut("s") else {
                panic!("stream disappeared");
            };
            let DataType::Stream(ref mut stream) = value.data else {
                panic!("not a stream");
            };
            stream.append(
                StreamId::new(9, 0),
                vec![("fresh".to_string(), "yes".to_string())],
            );
        }
        {
            let mut state_guard = state.lock().await;
            state_guard.notify_stream_key("s");
        }

        let result = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .expect("XREAD should resolve")
            .expect("task should not panic")
            .unwrap();

        match result {
            CommandResult::Response(response) => {
                assert!(response.contains("9-0"), "got {:?}", response);
                assert!(response.contains("fresh"), "got {:?}", response);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
