use flock_client::{call, CallError};
use flock_codec::{ErrorCode, Request, Response};
use flock_node::{Node, NodeConfig, RaftStateMachine, Role};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{delay_for, Instant};

fn config(name: &str, port: u16, members: &str, leader_timeout: f64) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        addr: "127.0.0.1".to_string(),
        port,
        members: members.to_string(),
        leader_timeout,
        election_timeout_jitter: 0.05,
        vote_interval: 0.05,
        heartbeat_interval: 0.05,
        report_interval: 60.0,
        log_level: "info".to_string(),
        log_color: false,
        data_dir: std::env::temp_dir()
            .join(format!("flock-test-{}", port))
            .to_string_lossy()
            .to_string(),
    }
}

fn start(config: NodeConfig) -> Arc<RaftStateMachine> {
    let _ = tracing_subscriber::fmt::try_init();
    let node = Node::new(config).unwrap();
    let context = node.context();
    tokio::spawn(async move {
        node.run(futures::future::pending::<()>()).await.unwrap();
    });
    context
}

/// Calls a node, retrying while its listener is still coming up.
async fn call_ready(addr: &str, request: &Request) -> Response {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match call(addr, request).await {
            Ok(response) => return response,
            Err(CallError::ConnectionRefused) if Instant::now() < deadline => {
                delay_for(Duration::from_millis(25)).await;
            }
            Err(err) => panic!("call to {} failed: {}", addr, err),
        }
    }
}

#[tokio::test]
async fn two_node_election_converges_on_one_leader() {
    let members = "raft-a:127.0.0.1:28468,raft-b:127.0.0.1:28469";
    // Staggered timeouts so raft-a reliably stands for election first.
    let a = start(config("raft-a", 28468, members, 0.15));
    let b = start(config("raft-b", 28469, members, 0.6));

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status_a = a.status().await;
        let status_b = b.status().await;

        if status_a.role == Role::Leader && status_b.role == Role::Follower {
            assert_eq!(status_b.leader.as_deref(), Some("raft-a"));
            assert_eq!(status_a.term, status_b.term);
            break;
        }
        if status_b.role == Role::Leader && status_a.role == Role::Follower {
            assert_eq!(status_a.leader.as_deref(), Some("raft-b"));
            break;
        }

        assert!(
            Instant::now() < deadline,
            "no leader elected: {:?} / {:?}",
            status_a,
            status_b
        );
        delay_for(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn heartbeats_keep_a_follower_loyal() {
    let members = "raft-c:127.0.0.1:28470,ghost:127.0.0.1:28499";
    let c = start(config("raft-c", 28470, members, 0.4));
    let addr = "127.0.0.1:28470";

    let request = Request::Heartbeat {
        term: 1,
        leader: "ext".to_string(),
    };
    assert_eq!(
        call_ready(addr, &request).await,
        Response::Ok("raft-c".to_string())
    );

    // Keep asserting liveness well past the leader timeout.
    for _ in 0..12 {
        delay_for(Duration::from_millis(100)).await;
        assert_eq!(
            call(addr, &request).await.unwrap(),
            Response::Ok("raft-c".to_string())
        );
    }

    let status = c.status().await;
    assert_eq!(status.role, Role::Follower);
    assert_eq!(status.leader.as_deref(), Some("ext"));
    assert_eq!(status.term, 1);
}

#[tokio::test]
async fn stale_terms_and_wrong_roles_are_rejected() {
    let members = "raft-d:127.0.0.1:28471,ghost:127.0.0.1:28498";
    let d = start(config("raft-d", 28471, members, 10.0));
    let addr = "127.0.0.1:28471";

    let granted = call_ready(
        addr,
        &Request::Vote {
            term: 5,
            candidate: "raft-x".to_string(),
        },
    )
    .await;
    assert_eq!(granted, Response::Ok("raft-d".to_string()));

    let stale = call(
        addr,
        &Request::Heartbeat {
            term: 3,
            leader: "raft-z".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(stale, Response::Err(ErrorCode::TermIsLower));

    let status = d.status().await;
    assert_eq!(status.leader.as_deref(), Some("raft-x"));
    assert_eq!(status.term, 5);

    // A non-follower does not grant votes.
    d.promote_to_candidate().await.unwrap();
    let rejected = call(
        addr,
        &Request::Vote {
            term: 7,
            candidate: "raft-y".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(rejected, Response::Err(ErrorCode::WrongState));
}

#[tokio::test]
async fn missing_leader_triggers_candidacy() {
    let members = "raft-e:127.0.0.1:28472,ghost:127.0.0.1:28497";
    let e = start(config("raft-e", 28472, members, 0.2));

    let deadline = Instant::now() + Duration::from_secs(3);
    while e.role().await != Role::Candidate {
        assert!(Instant::now() < deadline, "node never stood for election");
        delay_for(Duration::from_millis(25)).await;
    }

    // With no peer granting votes it keeps campaigning.
    delay_for(Duration::from_millis(300)).await;
    assert_eq!(e.role().await, Role::Candidate);
    assert!(e.term().await >= 1);
}

#[tokio::test]
async fn one_ordered_response_per_request_line() {
    let members = "raft-f:127.0.0.1:28473,ghost:127.0.0.1:28496";
    let _f = start(config("raft-f", 28473, members, 10.0));
    let addr = "127.0.0.1:28473";

    // Wait for the listener.
    call_ready(
        addr,
        &Request::Heartbeat {
            term: 1,
            leader: "ext".to_string(),
        },
    )
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"bogus 1 2\nheartbeat 2 ext\nheartbeat nope ext\n")
        .await
        .unwrap();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while buf.iter().filter(|&&b| b == b'\n').count() < 3 {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "server closed early: {:?}", buf);
        buf.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.split("\r\n").collect();
    assert_eq!(lines[0], "-ERR:UNKNOWN_ERROR");
    assert_eq!(lines[1], "+OK:raft-f");
    assert_eq!(lines[2], "-ERR:UNKNOWN_ERROR");
}

/// A peer that grants every vote but rejects every heartbeat as stale,
/// reporting each request line it served.
async fn contrary_peer(mut listener: TcpListener, seen: mpsc::UnboundedSender<String>) {
    loop {
        let (stream, _) = listener.accept().await.unwrap();
        let seen = seen.clone();
        tokio::spawn(async move {
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let reply = if line.starts_with("vote") {
                    "+OK:ghost\r\n"
                } else {
                    "-ERR:TERM_IS_LOWER\r\n"
                };
                write_half.write_all(reply.as_bytes()).await.unwrap();
                let _ = seen.send(line.trim().to_string());
            }
        });
    }
}

#[tokio::test]
async fn a_rejected_heartbeat_deposes_the_leader() {
    let members = "raft-h:127.0.0.1:28476,ghost:127.0.0.1:28475";
    let listener = TcpListener::bind("127.0.0.1:28475").await.unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(contrary_peer(listener, seen_tx));

    let h = start(config("raft-h", 28476, members, 0.15));

    // The ghost grants the election, then rejects the resulting heartbeat.
    loop {
        let line = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("the node never contacted its peer")
            .expect("peer task ended");
        if line.starts_with("heartbeat") {
            break;
        }
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while h.role().await == Role::Leader {
        assert!(Instant::now() < deadline, "leader never stepped down");
        delay_for(Duration::from_millis(5)).await;
    }
    assert!(h.term().await >= 1);
}

#[tokio::test]
async fn each_call_uses_a_fresh_connection() {
    let members = "raft-g:127.0.0.1:28474,ghost:127.0.0.1:28495";
    let _g = start(config("raft-g", 28474, members, 10.0));
    let addr = "127.0.0.1:28474";

    let request = Request::Heartbeat {
        term: 1,
        leader: "ext".to_string(),
    };
    let first = call_ready(addr, &request).await;
    let second = call(addr, &request).await.unwrap();
    assert_eq!(first, second);
}
