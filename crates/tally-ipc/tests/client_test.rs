//! Client tests against an in-process socket server

use tally_core::{RootRequest, WordCountResult};
use tally_ipc::client::DaemonClient;
use tally_ipc::frame::{read_frame, write_frame};
use tally_ipc::{
    decode_payload, IpcError, TallyRequest, TallyResponse, MAX_REQUEST_SIZE, MAX_RESPONSE_SIZE,
};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};

/// Answers every request on one connection with a canned response
async fn serve_one(listener: UnixListener) {
    let (mut stream, _) = listener.accept().await.unwrap();
    while let Some(payload) = read_frame(&mut stream, MAX_REQUEST_SIZE).await.unwrap() {
        let response = match decode_payload::<TallyRequest>(&payload) {
            Ok(TallyRequest::Handshake { client_version }) => TallyResponse::HandshakeAck {
                server_version: format!("server-for-{}", client_version),
            },
            Ok(TallyRequest::Status) => TallyResponse::StatusAck {
                status: "running".to_string(),
            },
            Ok(TallyRequest::CountWords { roots }) => TallyResponse::Words {
                result: roots
                    .iter()
                    .map(|(key, _)| (key.clone(), vec![("word".to_string(), 1)].into_iter().collect()))
                    .collect::<WordCountResult>(),
            },
            Err(e) => TallyResponse::Error(e.to_string()),
        };
        write_frame(&mut stream, &response, MAX_RESPONSE_SIZE).await.unwrap();
    }
}

#[tokio::test]
async fn test_client_conversation() {
    let temp = TempDir::new().unwrap();
    let socket = temp.path().join("tally.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let server = tokio::spawn(serve_one(listener));

    let mut client = DaemonClient::connect_to(&socket).await.unwrap();
    let version = client.handshake().await.unwrap();
    assert!(version.starts_with("server-for-"));
    assert_eq!(client.status().await.unwrap(), "running");

    let roots: RootRequest = vec![("a", "/x"), ("b", "/y")].into_iter().collect();
    let result = client.count_words(roots).await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.get("b").unwrap().get("word"), 1);

    drop(client);
    server.await.unwrap();
}

#[tokio::test]
async fn test_daemon_error_is_surfaced() {
    let temp = TempDir::new().unwrap();
    let socket = temp.path().join("err.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_frame(&mut stream, MAX_REQUEST_SIZE).await.unwrap();
        write_frame(&mut stream, &TallyResponse::Error("bad request".to_string()), MAX_RESPONSE_SIZE)
            .await
            .unwrap();
    });

    let mut client = DaemonClient::connect_to(&socket).await.unwrap();
    let err = client.status().await.unwrap_err();
    assert!(matches!(err, IpcError::Daemon(ref m) if m == "bad request"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_oversized_length_prefix_rejected() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    a.write_all(&((MAX_REQUEST_SIZE as u32) + 1).to_le_bytes())
        .await
        .unwrap();
    let err = read_frame(&mut b, MAX_REQUEST_SIZE).await.unwrap_err();
    assert!(matches!(err, IpcError::FrameTooLarge { .. }));
}

#[tokio::test]
async fn test_clean_close_reads_as_none() {
    let (a, mut b) = UnixStream::pair().unwrap();
    drop(a);
    assert!(read_frame(&mut b, MAX_REQUEST_SIZE).await.unwrap().is_none());
}

#[tokio::test]
async fn test_connect_to_missing_socket_fails() {
    let temp = TempDir::new().unwrap();
    let err = DaemonClient::connect_to(temp.path().join("absent.sock"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, IpcError::Io(_)));
}
