//! End-to-end tests over real TCP
//!
//! Each test starts the real accept loop on an ephemeral port and drives it
//! with raw RESP, the way an external client would.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::{Buf, BytesMut};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{Instant, sleep, timeout};

    use crate::config::ServerConfig;
    use crate::protocol::{Frame, Parsed, parse_request};
    use crate::server::{self, Shared};

    async fn start_server() -> (SocketAddr, Arc<Shared>) {
        let config = ServerConfig::new(0, None, None, None).unwrap();
        let shared = Arc::new(Shared::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_shared = shared.clone();
        tokio::spawn(async move {
            let _ = server::run(server_shared, listener).await;
        });
        (addr, shared)
    }

    struct Client {
        stream: TcpStream,
        buf: BytesMut,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                buf: BytesMut::with_capacity(4096),
            }
        }

        async fn send(&mut self, args: &[&str]) {
            let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
            self.stream
                .write_all(&Frame::command(&args).encode())
                .await
                .unwrap();
        }

        async fn read_frame(&mut self) -> Frame {
            loop {
                match parse_request(&self.buf).unwrap() {
                    Parsed::Complete { frame, consumed } => {
                        self.buf.advance(consumed);
                        return frame;
                    }
                    Parsed::Incomplete => {
                        let n = self.stream.read_buf(&mut self.buf).await.unwrap();
                        assert!(n > 0, "server closed the connection unexpectedly");
                    }
                }
            }
        }

        async fn roundtrip(&mut self, args: &[&str]) -> Frame {
            self.send(args).await;
            self.read_frame().await
        }
    }

    fn bulk_text(frame: &Frame) -> String {
        match frame {
            Frame::Bulk(data) => String::from_utf8_lossy(data).into_owned(),
            other => panic!("expected a bulk string, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_echo_and_inline_commands() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.roundtrip(&["PING"]).await, Frame::Simple("PONG".into()));
        assert_eq!(client.roundtrip(&["ECHO", "hey"]).await, Frame::bulk("hey"));

        // Inline command over the same connection.
        client.stream.write_all(b"PING\r\n").await.unwrap();
        assert_eq!(client.read_frame().await, Frame::Simple("PONG".into()));
    }

    #[tokio::test]
    async fn expiration_scenario() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(
            client.roundtrip(&["SET", "foo", "bar", "PX", "100"]).await,
            Frame::ok()
        );
        assert_eq!(client.roundtrip(&["GET", "foo"]).await, Frame::bulk("bar"));
        sleep(Duration::from_millis(150)).await;
        assert_eq!(client.roundtrip(&["GET", "foo"]).await, Frame::NullBulk);
        assert_eq!(client.roundtrip(&["EXISTS", "foo"]).await, Frame::Integer(0));
    }

    #[tokio::test]
    async fn stream_ids_and_range() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(
            client.roundtrip(&["XADD", "s", "1000-0", "f", "1"]).await,
            Frame::bulk("1000-0")
        );
        // Auto-sequence within the same millisecond.
        assert_eq!(
            client.roundtrip(&["XADD", "s", "1000-*", "f", "2"]).await,
            Frame::bulk("1000-1")
        );
        assert_eq!(
            client.roundtrip(&["XADD", "s", "1000-0", "f", "3"]).await,
            Frame::error(
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
            )
        );

        let reply = client.roundtrip(&["XRANGE", "s", "-", "+"]).await;
        let Frame::Array(entries) = reply else { panic!() };
        assert_eq!(entries.len(), 2);
        assert_eq!(client.roundtrip(&["TYPE", "s"]).await, Frame::Simple("stream".into()));
    }

    #[tokio::test]
    async fn sorted_set_scenario() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(
            client
                .roundtrip(&["ZADD", "z", "1", "a", "1", "b", "2", "c"])
                .await,
            Frame::Integer(3)
        );
        assert_eq!(
            client.roundtrip(&["ZRANGE", "z", "0", "-1"]).await,
            Frame::Array(vec![Frame::bulk("a"), Frame::bulk("b"), Frame::bulk("c")])
        );
        assert_eq!(client.roundtrip(&["ZRANK", "z", "b"]).await, Frame::Integer(1));
        assert_eq!(client.roundtrip(&["ZSCORE", "z", "c"]).await, Frame::bulk("2"));
    }

    #[tokio::test]
    async fn geo_scenario() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(
            client
                .roundtrip(&["GEOADD", "geo", "-0.0884948", "51.506479", "London"])
                .await,
            Frame::Integer(1)
        );
        assert_eq!(
            client
                .roundtrip(&["GEOADD", "geo", "11.5030378", "48.164271", "Munich"])
                .await,
            Frame::Integer(1)
        );
        assert_eq!(
            client
                .roundtrip(&["GEOADD", "geo", "2.2944692", "48.8584625", "Paris"])
                .await,
            Frame::Integer(1)
        );

        let reply = client
            .roundtrip(&["GEODIST", "geo", "Munich", "Paris", "km"])
            .await;
        let km: f64 = bulk_text(&reply).parse().unwrap();
        assert!((km - 682.4777).abs() < 0.1, "got {} km", km);

        let reply = client
            .roundtrip(&[
                "GEOSEARCH", "geo", "FROMLONLAT", "11.5", "48.2", "BYRADIUS", "1000", "km",
            ])
            .await;
        assert_eq!(
            reply,
            Frame::Array(vec![
                Frame::bulk("London"),
                Frame::bulk("Munich"),
                Frame::bulk("Paris"),
            ])
        );
    }

    #[tokio::test]
    async fn blpop_wakes_on_push_from_another_connection() {
        let (addr, _shared) = start_server().await;
        let mut blocked = Client::connect(addr).await;
        let mut pusher = Client::connect(addr).await;
        let mut observer = Client::connect(addr).await;

        blocked.send(&["BLPOP", "q", "5"]).await;
        sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        assert_eq!(pusher.roundtrip(&["RPUSH", "q", "hello"]).await, Frame::Integer(1));

        let reply = timeout(Duration::from_secs(1), blocked.read_frame())
            .await
            .expect("BLPOP should wake well before its timeout");
        assert_eq!(
            reply,
            Frame::Array(vec![Frame::bulk("q"), Frame::bulk("hello")])
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(observer.roundtrip(&["LLEN", "q"]).await, Frame::Integer(0));
    }

    #[tokio::test]
    async fn blpop_times_out_to_null_array() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;
        let started = Instant::now();
        assert_eq!(
            client.roundtrip(&["BLPOP", "empty", "0.1"]).await,
            Frame::NullArray
        );
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn xread_block_wakes_on_xadd() {
        let (addr, _shared) = start_server().await;
        let mut blocked = Client::connect(addr).await;
        let mut writer = Client::connect(addr).await;

        blocked
            .send(&["XREAD", "BLOCK", "5000", "STREAMS", "s", "$"])
            .await;
        sleep(Duration::from_millis(100)).await;

        let id = writer.roundtrip(&["XADD", "s", "*", "k", "v"]).await;
        let id = bulk_text(&id);

        let reply = timeout(Duration::from_secs(1), blocked.read_frame())
            .await
            .expect("XREAD BLOCK should deliver the new entry");
        let expected = Frame::Array(vec![Frame::Array(vec![
            Frame::bulk("s"),
            Frame::Array(vec![Frame::Array(vec![
                Frame::bulk(id),
                Frame::Array(vec![Frame::bulk("k"), Frame::bulk("v")]),
            ])]),
        ])]);
        assert_eq!(reply, expected);
    }

    #[tokio::test]
    async fn transaction_scenario() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.roundtrip(&["MULTI"]).await, Frame::ok());
        assert_eq!(
            client.roundtrip(&["SET", "k", "1"]).await,
            Frame::Simple("QUEUED".into())
        );
        assert_eq!(
            client.roundtrip(&["INCR", "k"]).await,
            Frame::Simple("QUEUED".into())
        );
        assert_eq!(
            client.roundtrip(&["INCR", "k"]).await,
            Frame::Simple("QUEUED".into())
        );
        assert_eq!(
            client.roundtrip(&["EXEC"]).await,
            Frame::Array(vec![Frame::ok(), Frame::Integer(2), Frame::Integer(3)])
        );
        assert_eq!(client.roundtrip(&["GET", "k"]).await, Frame::bulk("3"));
    }

    #[tokio::test]
    async fn transactions_run_non_data_commands() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.roundtrip(&["MULTI"]).await, Frame::ok());
        for queued in [
            vec!["SELECT", "0"],
            vec!["PING"],
            vec!["ECHO", "hi"],
            vec!["BLPOP", "q", "5"],
            vec!["SUBSCRIBE", "news"],
        ] {
            assert_eq!(
                client.roundtrip(&queued).await,
                Frame::Simple("QUEUED".into())
            );
        }

        let reply = client.roundtrip(&["EXEC"]).await;
        assert_eq!(
            reply,
            Frame::Array(vec![
                Frame::ok(),
                Frame::Simple("PONG".into()),
                Frame::bulk("hi"),
                // Blocking commands inside EXEC answer immediately.
                Frame::NullArray,
                Frame::error("ERR SUBSCRIBE is not allowed in transactions"),
            ])
        );

        // The rejected SUBSCRIBE left the connection unsubscribed.
        assert_eq!(client.roundtrip(&["GET", "k"]).await, Frame::NullBulk);
    }

    #[tokio::test]
    async fn transaction_control_errors() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(
            client.roundtrip(&["EXEC"]).await,
            Frame::error("ERR EXEC without MULTI")
        );
        assert_eq!(
            client.roundtrip(&["DISCARD"]).await,
            Frame::error("ERR DISCARD without MULTI")
        );
        assert_eq!(client.roundtrip(&["MULTI"]).await, Frame::ok());
        assert_eq!(
            client.roundtrip(&["MULTI"]).await,
            Frame::error("ERR MULTI calls cannot be nested")
        );
        assert_eq!(
            client.roundtrip(&["SET", "x", "1"]).await,
            Frame::Simple("QUEUED".into())
        );
        assert_eq!(client.roundtrip(&["DISCARD"]).await, Frame::ok());
        assert_eq!(client.roundtrip(&["GET", "x"]).await, Frame::NullBulk);
    }

    #[tokio::test]
    async fn subscribed_mode_restricts_commands() {
        let (addr, _shared) = start_server().await;
        let mut subscriber = Client::connect(addr).await;
        let mut publisher = Client::connect(addr).await;

        assert_eq!(
            subscriber.roundtrip(&["SUBSCRIBE", "news"]).await,
            Frame::Array(vec![
                Frame::bulk("subscribe"),
                Frame::bulk("news"),
                Frame::Integer(1),
            ])
        );

        // Non-pubsub commands are rejected; the connection stays subscribed.
        let reply = subscriber.roundtrip(&["GET", "k"]).await;
        assert!(matches!(reply, Frame::Error(m) if m.contains("only (P)SUBSCRIBE")));

        // PING diverges to the array form in subscribed mode.
        assert_eq!(
            subscriber.roundtrip(&["PING"]).await,
            Frame::Array(vec![Frame::bulk("pong"), Frame::bulk("")])
        );

        assert_eq!(
            publisher.roundtrip(&["PUBLISH", "news", "hello"]).await,
            Frame::Integer(1)
        );
        assert_eq!(
            subscriber.read_frame().await,
            Frame::Array(vec![
                Frame::bulk("message"),
                Frame::bulk("news"),
                Frame::bulk("hello"),
            ])
        );

        assert_eq!(
            subscriber.roundtrip(&["UNSUBSCRIBE"]).await,
            Frame::Array(vec![
                Frame::bulk("unsubscribe"),
                Frame::bulk("news"),
                Frame::Integer(0),
            ])
        );
        // Out of subscribed mode again.
        assert_eq!(subscriber.roundtrip(&["GET", "k"]).await, Frame::NullBulk);
    }

    #[tokio::test]
    async fn info_and_config_surface() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        let info = bulk_text(&client.roundtrip(&["INFO"]).await);
        assert!(info.contains("role:master"));
        assert!(info.contains("master_repl_offset:0"));
        let replid_line = info
            .lines()
            .find(|l| l.starts_with("master_replid:"))
            .expect("INFO must carry master_replid");
        assert_eq!(replid_line.trim().len(), "master_replid:".len() + 40);

        let reply = client.roundtrip(&["CONFIG", "GET", "dir", "maxmemory"]).await;
        assert_eq!(
            reply,
            Frame::Array(vec![
                Frame::bulk("dir"),
                Frame::bulk(""),
                Frame::bulk("maxmemory"),
                Frame::bulk(""),
            ])
        );
    }

    #[tokio::test]
    async fn keys_type_and_del() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        client.roundtrip(&["SET", "user:1", "a"]).await;
        client.roundtrip(&["SET", "user:2", "b"]).await;
        client.roundtrip(&["RPUSH", "jobs", "x"]).await;

        let reply = client.roundtrip(&["KEYS", "user:*"]).await;
        assert_eq!(
            reply,
            Frame::Array(vec![Frame::bulk("user:1"), Frame::bulk("user:2")])
        );
        assert_eq!(
            client.roundtrip(&["TYPE", "jobs"]).await,
            Frame::Simple("list".into())
        );
        assert_eq!(
            client.roundtrip(&["DEL", "user:1", "user:2", "ghost"]).await,
            Frame::Integer(2)
        );
    }

    #[tokio::test]
    async fn master_side_replication_handshake_and_propagation() {
        let (addr, _shared) = start_server().await;
        let mut replica = Client::connect(addr).await;
        let mut writer = Client::connect(addr).await;

        assert_eq!(replica.roundtrip(&["PING"]).await, Frame::Simple("PONG".into()));
        assert_eq!(
            replica
                .roundtrip(&["REPLCONF", "listening-port", "6380"])
                .await,
            Frame::ok()
        );
        assert_eq!(
            replica.roundtrip(&["REPLCONF", "capa", "psync2"]).await,
            Frame::ok()
        );

        // PSYNC: +FULLRESYNC line, then the bulk-framed snapshot with no
        // trailing CRLF.
        replica.send(&["PSYNC", "?", "-1"]).await;
        let frame = replica.read_frame().await;
        let Frame::Simple(line) = frame else { panic!("expected +FULLRESYNC") };
        assert!(line.starts_with("FULLRESYNC "));
        let replid = line.split_whitespace().nth(1).unwrap();
        assert_eq!(replid.len(), 40);

        // Read the snapshot framing by hand.
        let header = loop {
            if let Some(pos) = replica.buf.windows(2).position(|w| w == b"\r\n") {
                let header = replica.buf[..pos].to_vec();
                replica.buf.advance(pos + 2);
                break header;
            }
            replica.stream.read_buf(&mut replica.buf).await.unwrap();
        };
        assert_eq!(header[0], b'$');
        let len: usize = String::from_utf8_lossy(&header[1..]).parse().unwrap();
        while replica.buf.len() < len {
            replica.stream.read_buf(&mut replica.buf).await.unwrap();
        }
        let snapshot = replica.buf[..len].to_vec();
        replica.buf.advance(len);
        assert_eq!(&snapshot[..9], b"REDIS0011");

        // A write on another connection must be mirrored verbatim.
        assert_eq!(
            writer.roundtrip(&["SET", "propagated_key", "val"]).await,
            Frame::ok()
        );
        let propagated = timeout(Duration::from_millis(500), replica.read_frame())
            .await
            .expect("write should be propagated to the replica link");
        assert_eq!(
            propagated,
            Frame::Array(vec![
                Frame::bulk("SET"),
                Frame::bulk("propagated_key"),
                Frame::bulk("val"),
            ])
        );

        // Reads must not propagate.
        assert_eq!(writer.roundtrip(&["GET", "propagated_key"]).await, Frame::bulk("val"));
        let nothing = timeout(Duration::from_millis(200), replica.read_frame()).await;
        assert!(nothing.is_err(), "reads must not reach the replica link");
    }

    #[tokio::test]
    async fn wait_counts_acked_replicas() {
        let (addr, _shared) = start_server().await;
        let mut replica = Client::connect(addr).await;
        let mut client = Client::connect(addr).await;

        // Minimal handshake to become a replica link.
        replica.roundtrip(&["REPLCONF", "listening-port", "6380"]).await;
        replica.send(&["PSYNC", "?", "-1"]).await;
        let _fullresync = replica.read_frame().await;
        // Consume the snapshot.
        loop {
            if let Some(pos) = replica.buf.windows(2).position(|w| w == b"\r\n") {
                let len: usize = String::from_utf8_lossy(&replica.buf[1..pos]).parse().unwrap();
                let total = pos + 2 + len;
                while replica.buf.len() < total {
                    replica.stream.read_buf(&mut replica.buf).await.unwrap();
                }
                replica.buf.advance(total);
                break;
            }
            replica.stream.read_buf(&mut replica.buf).await.unwrap();
        }

        // Generate a write so the barrier offset is nonzero.
        client.roundtrip(&["SET", "k", "v"]).await;
        let _mirrored = replica.read_frame().await;

        // WAIT broadcasts GETACK; answer it with a generous offset.
        client.send(&["WAIT", "1", "1000"]).await;
        let getack = timeout(Duration::from_millis(500), replica.read_frame())
            .await
            .expect("WAIT should broadcast GETACK");
        assert_eq!(
            getack,
            Frame::Array(vec![
                Frame::bulk("REPLCONF"),
                Frame::bulk("GETACK"),
                Frame::bulk("*"),
            ])
        );
        replica.send(&["REPLCONF", "ACK", "1000000"]).await;

        let reply = timeout(Duration::from_secs(1), client.read_frame())
            .await
            .expect("WAIT should return after the ACK");
        assert_eq!(reply, Frame::Integer(1));
    }

    #[tokio::test]
    async fn full_replica_pipeline_applies_master_writes() {
        let (master_addr, _master_shared) = start_server().await;

        // Replica: its own client-facing listener plus the replication link.
        let replica_config = ServerConfig::new(
            0,
            None,
            None,
            Some(format!("127.0.0.1 {}", master_addr.port())),
        )
        .unwrap();
        let replica_shared = Arc::new(Shared::new(replica_config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let replica_addr = listener.local_addr().unwrap();
        {
            let shared = replica_shared.clone();
            tokio::spawn(async move {
                let _ = server::run(shared, listener).await;
            });
        }
        {
            let shared = replica_shared.clone();
            tokio::spawn(async move {
                let _ = crate::replication::replica::run(
                    shared,
                    "127.0.0.1".to_string(),
                    master_addr.port(),
                )
                .await;
            });
        }

        // Give the handshake a moment, then write on the master.
        sleep(Duration::from_millis(200)).await;
        let mut master_client = Client::connect(master_addr).await;
        assert_eq!(
            master_client.roundtrip(&["SET", "propagated_key", "val"]).await,
            Frame::ok()
        );

        // The write must land in the replica keyspace shortly after.
        let mut replica_client = Client::connect(replica_addr).await;
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let reply = replica_client.roundtrip(&["GET", "propagated_key"]).await;
            if reply == Frame::bulk("val") {
                break;
            }
            assert!(
                Instant::now() < deadline,
                "replica never applied the propagated write, last reply {:?}",
                reply
            );
            sleep(Duration::from_millis(50)).await;
        }

        let info = bulk_text(&replica_client.roundtrip(&["INFO"]).await);
        assert!(info.contains("role:slave"));
    }

    #[tokio::test]
    async fn protocol_errors_close_the_connection() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        client.stream.write_all(b"$abc\r\n").await.unwrap();
        let mut out = Vec::new();
        // The server sends one error frame and then closes.
        let n = client.stream.read_to_end(&mut out).await.unwrap();
        assert!(n > 0);
        assert!(out.starts_with(b"-ERR Protocol error"));
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let (addr, _shared) = start_server().await;
        let mut client = Client::connect(addr).await;

        let mut batch = Vec::new();
        batch.extend_from_slice(&Frame::command(&[b"SET".to_vec(), b"a".to_vec(), b"1".to_vec()]).encode());
        batch.extend_from_slice(&Frame::command(&[b"INCR".to_vec(), b"a".to_vec()]).encode());
        batch.extend_from_slice(&Frame::command(&[b"GET".to_vec(), b"a".to_vec()]).encode());
        client.stream.write_all(&batch).await.unwrap();

        assert_eq!(client.read_frame().await, Frame::ok());
        assert_eq!(client.read_frame().await, Frame::Integer(2));
        assert_eq!(client.read_frame().await, Frame::bulk("2"));
    }
}
