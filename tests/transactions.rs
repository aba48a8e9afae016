//! Transaction semantics over the wire: queuing, EXEC, DISCARD, and the
//! poisoned-queue EXECABORT path.

mod common;

use common::{TestClient, spawn_master};

#[tokio::test]
async fn test_multi_exec_literal_scenario() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    assert_eq!(client.command_encoded(&["MULTI"]).await, "+OK\r\n");
    assert_eq!(client.command_encoded(&["SET", "a", "1"]).await, "+QUEUED\r\n");
    assert_eq!(client.command_encoded(&["INCR", "a"]).await, "+QUEUED\r\n");
    assert_eq!(client.command_encoded(&["EXEC"]).await, "*2\r\n+OK\r\n:2\r\n");
}

#[tokio::test]
async fn test_queued_commands_do_not_execute_until_exec() {
    let address = spawn_master().await;
    let mut queuing = TestClient::connect(address).await;
    let mut observer = TestClient::connect(address).await;

    queuing.command(&["MULTI"]).await;
    queuing.command(&["SET", "pending", "yes"]).await;

    assert_eq!(observer.command_encoded(&["GET", "pending"]).await, "$-1\r\n");

    queuing.command(&["EXEC"]).await;

    assert_eq!(
        observer.command_encoded(&["GET", "pending"]).await,
        "$3\r\nyes\r\n"
    );
}

#[tokio::test]
async fn test_discard_drops_the_queue() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    client.command(&["MULTI"]).await;
    client.command(&["SET", "ghost", "1"]).await;

    assert_eq!(client.command_encoded(&["DISCARD"]).await, "+OK\r\n");
    assert_eq!(client.command_encoded(&["GET", "ghost"]).await, "$-1\r\n");
}

#[tokio::test]
async fn test_transaction_control_error_texts() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    assert_eq!(
        client.command_encoded(&["EXEC"]).await,
        "-ERR EXEC without MULTI\r\n"
    );
    assert_eq!(
        client.command_encoded(&["DISCARD"]).await,
        "-ERR DISCARD without MULTI\r\n"
    );

    client.command(&["MULTI"]).await;
    assert_eq!(
        client.command_encoded(&["MULTI"]).await,
        "-ERR MULTI calls can not be nested\r\n"
    );
}

#[tokio::test]
async fn test_unknown_command_poisons_the_queue() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    client.command(&["MULTI"]).await;

    assert_eq!(
        client.command_encoded(&["NOSUCH", "x"]).await,
        "-ERR unknown command 'nosuch'\r\n"
    );
    assert_eq!(client.command_encoded(&["SET", "a", "1"]).await, "+QUEUED\r\n");
    assert_eq!(
        client.command_encoded(&["EXEC"]).await,
        "-EXECABORT Transaction discarded because of previous errors.\r\n"
    );

    // The queue is gone and nothing in it ran.
    assert_eq!(client.command_encoded(&["GET", "a"]).await, "$-1\r\n");
    assert_eq!(
        client.command_encoded(&["EXEC"]).await,
        "-ERR EXEC without MULTI\r\n"
    );
}

#[tokio::test]
async fn test_runtime_error_inside_exec_keeps_other_results() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    client.command(&["SET", "word", "abc"]).await;

    client.command(&["MULTI"]).await;
    client.command(&["INCR", "word"]).await;
    client.command(&["SET", "after", "ok"]).await;

    assert_eq!(
        client.command_encoded(&["EXEC"]).await,
        "*2\r\n-ERR value is not an integer or out of range\r\n+OK\r\n"
    );
    assert_eq!(
        client.command_encoded(&["GET", "after"]).await,
        "$2\r\nok\r\n"
    );
}

#[tokio::test]
async fn test_ping_answers_queued_inside_multi() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    client.command(&["MULTI"]).await;
    assert_eq!(client.command_encoded(&["PING"]).await, "+QUEUED\r\n");
    assert_eq!(client.command_encoded(&["EXEC"]).await, "*1\r\n+PONG\r\n");
}

#[tokio::test]
async fn test_exec_with_empty_queue() {
    let address = spawn_master().await;
    let mut client = TestClient::connect(address).await;

    client.command(&["MULTI"]).await;
    assert_eq!(client.command_encoded(&["EXEC"]).await, "*0\r\n");
}

#[tokio::test]
async fn test_transactions_are_per_connection() {
    let address = spawn_master().await;
    let mut queuing = TestClient::connect(address).await;
    let mut direct = TestClient::connect(address).await;

    queuing.command(&["MULTI"]).await;
    queuing.command(&["SET", "a", "queued"]).await;

    // Another connection executes immediately.
    assert_eq!(direct.command_encoded(&["SET", "a", "direct"]).await, "+OK\r\n");
    assert_eq!(direct.command_encoded(&["GET", "a"]).await, "$6\r\ndirect\r\n");

    queuing.command(&["EXEC"]).await;
    assert_eq!(direct.command_encoded(&["GET", "a"]).await, "$6\r\nqueued\r\n");
}
