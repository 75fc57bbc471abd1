//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! End-to-end tests over loopback TCP, with the reactor on its own thread
//! and plain blocking sockets playing the peer.

use confab_reactor::{ConnId, Reactor, ReactorApi, ReactorConfig, ReactorHandler};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn test_config() -> ReactorConfig {
    ReactorConfig::default().with_poll_timeout(Duration::from_millis(25))
}

fn connect(addr: std::net::SocketAddr) -> (TcpStream, BufReader<TcpStream>) {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader = BufReader::new(stream.try_clone().unwrap());
    (stream, reader)
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line
}

/// Greets, echoes, and closes politely on QUIT.
struct EchoHandler;

impl ReactorHandler for EchoHandler {
    type Session = ();

    fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) {
        api.send_line(id, "hello");
    }

    fn on_line(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: &mut (), line: &str) {
        if line == "QUIT" {
            api.send_line(id, "bye");
            api.request_close(id);
        } else {
            api.send_line(id, line);
        }
    }
}

#[test]
fn test_echo_roundtrip() {
    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let flag = reactor.shutdown_flag();
    let join = thread::spawn(move || reactor.run(&mut EchoHandler));

    let (mut stream, mut reader) = connect(addr);
    assert_eq!(read_line(&mut reader), "hello\n");
    stream.write_all(b"one two three\n").unwrap();
    assert_eq!(read_line(&mut reader), "one two three\n");
    // Several lines in one segment come back in order.
    stream.write_all(b"a\nb\nc\n").unwrap();
    assert_eq!(read_line(&mut reader), "a\n");
    assert_eq!(read_line(&mut reader), "b\n");
    assert_eq!(read_line(&mut reader), "c\n");

    flag.set();
    join.join().unwrap().unwrap();
}

#[test]
fn test_quit_flushes_farewell_then_closes() {
    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let flag = reactor.shutdown_flag();
    let join = thread::spawn(move || reactor.run(&mut EchoHandler));

    let (mut stream, mut reader) = connect(addr);
    assert_eq!(read_line(&mut reader), "hello\n");
    stream.write_all(b"QUIT\n").unwrap();
    assert_eq!(read_line(&mut reader), "bye\n");
    // The farewell was flushed before the close; now the socket is gone.
    let mut rest = String::new();
    assert_eq!(reader.read_line(&mut rest).unwrap(), 0);

    flag.set();
    join.join().unwrap().unwrap();
}

#[test]
fn test_lines_after_quit_are_not_dispatched() {
    struct CountingHandler {
        tx: mpsc::Sender<String>,
    }

    impl ReactorHandler for CountingHandler {
        type Session = ();

        fn on_accepted(&mut self, _api: &mut dyn ReactorApi, _id: ConnId) {}

        fn on_line(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: &mut (), line: &str) {
            self.tx.send(line.to_string()).unwrap();
            if line == "QUIT" {
                api.request_close(id);
            }
        }
    }

    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let flag = reactor.shutdown_flag();
    let (tx, rx) = mpsc::channel();
    let join = thread::spawn(move || reactor.run(&mut CountingHandler { tx }));

    let (mut stream, mut reader) = connect(addr);
    // One segment carrying lines both before and after the close command.
    stream.write_all(b"first\nQUIT\nafter\n").unwrap();
    let mut rest = String::new();
    assert_eq!(reader.read_line(&mut rest).unwrap(), 0);

    flag.set();
    join.join().unwrap().unwrap();

    let seen: Vec<String> = rx.try_iter().collect();
    assert_eq!(seen, vec!["first", "QUIT"]);
}

#[test]
fn test_lines_arriving_with_eof_still_dispatch() {
    struct LastWordsHandler {
        tx: mpsc::Sender<String>,
    }

    impl ReactorHandler for LastWordsHandler {
        type Session = ();

        fn on_accepted(&mut self, _api: &mut dyn ReactorApi, _id: ConnId) {}

        fn on_line(&mut self, _api: &mut dyn ReactorApi, _id: ConnId, _s: &mut (), line: &str) {
            self.tx.send(line.to_string()).unwrap();
        }

        fn on_closed(&mut self, api: &mut dyn ReactorApi, _id: ConnId, _s: ()) {
            api.request_shutdown();
        }
    }

    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let (tx, rx) = mpsc::channel();
    let join = thread::spawn(move || reactor.run(&mut LastWordsHandler { tx }));

    // The peer's final command and its hangup land in the same read batch.
    let (mut stream, reader) = connect(addr);
    stream.write_all(b"QUIT :bye\n").unwrap();
    // Close both fd duplicates so the hangup actually reaches the reactor.
    drop(reader);
    drop(stream);
    join.join().unwrap().unwrap();

    let seen: Vec<String> = rx.try_iter().collect();
    assert_eq!(seen, vec!["QUIT :bye"]);
}

#[test]
fn test_unterminated_line_overflow_drops_connection() {
    struct OverflowHandler {
        lines: mpsc::Sender<String>,
        closed: mpsc::Sender<ConnId>,
    }

    impl ReactorHandler for OverflowHandler {
        type Session = ();

        fn on_accepted(&mut self, _api: &mut dyn ReactorApi, _id: ConnId) {}

        fn on_line(&mut self, _api: &mut dyn ReactorApi, _id: ConnId, _s: &mut (), line: &str) {
            self.lines.send(line.to_string()).unwrap();
        }

        fn on_closed(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: ()) {
            self.closed.send(id).unwrap();
            api.request_shutdown();
        }
    }

    let config = test_config().with_max_line_bytes(64);
    let mut reactor = Reactor::new(config).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let (lines_tx, lines_rx) = mpsc::channel();
    let (closed_tx, closed_rx) = mpsc::channel();
    let join = thread::spawn(move || {
        reactor.run(&mut OverflowHandler {
            lines: lines_tx,
            closed: closed_tx,
        })
    });

    let (mut stream, mut reader) = connect(addr);
    stream.write_all(&[b'x'; 1024]).unwrap();
    // The reactor drops us without ever dispatching a line.
    let mut rest = String::new();
    assert_eq!(reader.read_line(&mut rest).unwrap(), 0);
    join.join().unwrap().unwrap();

    assert_eq!(closed_rx.try_iter().count(), 1);
    assert!(lines_rx.try_iter().next().is_none());
}

#[test]
fn test_graceful_shutdown_delivers_farewell() {
    struct FarewellHandler;

    impl ReactorHandler for FarewellHandler {
        type Session = ();

        fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) {
            api.send_line(id, "welcome");
        }

        fn on_shutdown(&mut self, api: &mut dyn ReactorApi) {
            for id in api.connection_ids() {
                api.send_line(id, "closing");
            }
        }
    }

    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let flag = reactor.shutdown_flag();
    let join = thread::spawn(move || reactor.run(&mut FarewellHandler));

    let (_stream, mut reader) = connect(addr);
    assert_eq!(read_line(&mut reader), "welcome\n");

    flag.set();
    join.join().unwrap().unwrap();

    assert_eq!(read_line(&mut reader), "closing\n");
    let mut rest = String::new();
    assert_eq!(reader.read_line(&mut rest).unwrap(), 0);
}

#[test]
fn test_peer_hangup_reports_closed_once() {
    struct HangupHandler {
        tx: mpsc::Sender<ConnId>,
    }

    impl ReactorHandler for HangupHandler {
        type Session = ();

        fn on_accepted(&mut self, _api: &mut dyn ReactorApi, _id: ConnId) {}

        fn on_closed(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: ()) {
            self.tx.send(id).unwrap();
            api.request_shutdown();
        }
    }

    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let (tx, rx) = mpsc::channel();
    let join = thread::spawn(move || reactor.run(&mut HangupHandler { tx }));

    let (stream, reader) = connect(addr);
    // Close both fd duplicates so the hangup actually reaches the reactor.
    drop(reader);
    drop(stream);
    join.join().unwrap().unwrap();

    let closed: Vec<ConnId> = rx.try_iter().collect();
    assert_eq!(closed.len(), 1);
}

#[test]
fn test_outbound_connect_login_and_close() {
    struct ClientHandler {
        tx: mpsc::Sender<String>,
    }

    impl ReactorHandler for ClientHandler {
        type Session = ();

        fn on_accepted(&mut self, _api: &mut dyn ReactorApi, _id: ConnId) {
            unreachable!("client mode never accepts");
        }

        fn on_connected(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: &mut ()) {
            api.send_line(id, "LOGIN bot");
        }

        fn on_line(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: &mut (), line: &str) {
            self.tx.send(line.to_string()).unwrap();
            api.request_close(id);
        }
    }

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    let join = thread::spawn(move || {
        let mut reactor: Reactor<ClientHandler> = Reactor::new(test_config()).unwrap();
        reactor.connect(&addr.to_string(), ()).unwrap();
        reactor.run(&mut ClientHandler { tx })
    });

    let (mut peer, _) = listener.accept().unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reader = BufReader::new(peer.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "LOGIN bot\n");
    peer.write_all(b"OK\n").unwrap();

    // The loop exits on its own once its only connection closes.
    join.join().unwrap().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "OK");
}

#[test]
fn test_broadcast_reaches_all_connections() {
    struct BroadcastHandler;

    impl ReactorHandler for BroadcastHandler {
        type Session = ();

        fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) {
            api.send_line(id, "joined");
        }

        fn on_line(&mut self, api: &mut dyn ReactorApi, _id: ConnId, _s: &mut (), line: &str) {
            for id in api.connection_ids() {
                api.send_line(id, line);
            }
        }
    }

    let mut reactor = Reactor::new(test_config()).unwrap();
    let addr = reactor.listen("127.0.0.1:0").unwrap();
    let flag = reactor.shutdown_flag();
    let join = thread::spawn(move || reactor.run(&mut BroadcastHandler));

    let (mut alice, mut alice_rx) = connect(addr);
    assert_eq!(read_line(&mut alice_rx), "joined\n");
    let (_bob, mut bob_rx) = connect(addr);
    assert_eq!(read_line(&mut bob_rx), "joined\n");

    alice.write_all(b"news\n").unwrap();
    assert_eq!(read_line(&mut alice_rx), "news\n");
    assert_eq!(read_line(&mut bob_rx), "news\n");

    flag.set();
    join.join().unwrap().unwrap();
}
