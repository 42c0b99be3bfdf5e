use std::time::Duration;

use gamutrf_core::scan::{ScanFrame, ScannerEndpoint};
use gamutrf_receiver::{ScanSource, TcpScanReceiver};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

async fn listener() -> (TcpListener, ScannerEndpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    (
        listener,
        ScannerEndpoint {
            host: "127.0.0.1".to_string(),
            port,
        },
    )
}

async fn wait_for_frame(receiver: &mut TcpScanReceiver) -> ScanFrame {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = receiver.read_buff() {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("frame before timeout")
}

#[tokio::test]
async fn receives_records_from_a_scanner() {
    let (listener, endpoint) = listener().await;
    let mut receiver = TcpScanReceiver::spawn(vec![endpoint], 1e4).expect("spawn receiver");

    let (mut socket, _) = listener.accept().await.expect("accept");
    socket
        .write_all(b"not json\n{\"ts\": 5.0, \"config\": {\"scanner\": \"a\"}, \"buckets\": {\"2400000000\": -120.5}}\n")
        .await
        .expect("write");

    let frame = wait_for_frame(&mut receiver).await;
    assert_eq!(frame.scan_time(), Some(5.0));
    assert_eq!(frame.configs[0]["scanner"], "a");
    assert!((frame.points[0].freq - 2400.0).abs() < 1e-9);
    assert!(receiver.healthy());

    receiver.stop();
    assert!(!receiver.healthy());
}

#[tokio::test]
async fn combines_sweeps_from_every_scanner() {
    let (first_listener, first) = listener().await;
    let (second_listener, second) = listener().await;
    let mut receiver = TcpScanReceiver::spawn(vec![first, second], 1e4).expect("spawn receiver");

    let (mut first_socket, _) = first_listener.accept().await.expect("accept first");
    let (mut second_socket, _) = second_listener.accept().await.expect("accept second");

    first_socket
        .write_all(b"{\"ts\": 1.0, \"config\": {\"id\": 1}, \"buckets\": {\"100000000\": -50.0}}\n")
        .await
        .expect("write first");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(receiver.read_buff().is_none());

    second_socket
        .write_all(b"{\"ts\": 2.0, \"config\": {\"id\": 2}, \"buckets\": {\"200000000\": -60.0}}\n")
        .await
        .expect("write second");

    let frame = wait_for_frame(&mut receiver).await;
    assert_eq!(frame.configs.len(), 2);
    assert_eq!(frame.configs[0]["id"], 1);
    assert_eq!(frame.configs[1]["id"], 2);
    assert_eq!(frame.points.len(), 2);
    assert_eq!(frame.scan_time(), Some(2.0));
}

#[tokio::test]
async fn reconnects_after_scanner_restart() {
    let (listener, endpoint) = listener().await;
    let mut receiver = TcpScanReceiver::spawn(vec![endpoint], 1e4).expect("spawn receiver");

    let (socket, _) = listener.accept().await.expect("accept");
    drop(socket);

    let (mut socket, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("reconnect before timeout")
        .expect("accept again");
    socket
        .write_all(b"{\"ts\": 9.0, \"buckets\": {\"100000000\": -50.0}}\n")
        .await
        .expect("write");

    let frame = wait_for_frame(&mut receiver).await;
    assert_eq!(frame.scan_time(), Some(9.0));
}
