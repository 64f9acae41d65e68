//! Example: two editors sharing one document over channels.
//!
//! Each site runs on its own thread and owns its replica outright. Local
//! edits and inbound wire payloads for a replica all funnel through that
//! thread's channel, so the document never needs a lock.
//!
//! Run with `RUST_LOG=logoot=debug` to watch identifiers being allocated.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use logoot::prelude::*;
use tracing_subscriber::EnvFilter;

enum Message {
    /// Type `text` at `offset`.
    Type { text: String, offset: usize },
    /// Erase `start..=end`.
    Erase { start: usize, end: usize },
    /// A JSON payload from the peer.
    Remote(String),
    /// Stop and report the final text.
    Done,
}

fn editor(site: &'static str, inbox: Receiver<Message>, peer: Sender<Message>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut doc = ReplicatedDocument::new(site);
        let publish = |ops: Vec<Operation>| {
            for op in ops {
                if let Ok(payload) = op.to_json() {
                    // The peer may already have shut down.
                    let _ = peer.send(Message::Remote(payload));
                }
            }
        };

        for message in inbox {
            match message {
                Message::Type { text, offset } => publish(doc.insert(&text, offset)),
                Message::Erase { start, end } => publish(doc.delete(start, end)),
                Message::Remote(payload) => {
                    if let Err(err) = doc.receive(&payload) {
                        eprintln!("[{site}] rejected payload: {err}");
                    }
                }
                Message::Done => break,
            }
            println!("[{site}] {:?}", doc.value());
        }
        doc.value()
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Collaborative editing (Logoot) ===\n");

    let (alice_tx, alice_rx) = mpsc::channel();
    let (bob_tx, bob_rx) = mpsc::channel();

    let alice = editor("alice", alice_rx, bob_tx.clone());
    let bob = editor("bob", bob_rx, alice_tx.clone());

    let script = [
        (&alice_tx, Message::Type { text: "hello world".into(), offset: 0 }),
        (&bob_tx, Message::Type { text: "!".into(), offset: 0 }),
        (&alice_tx, Message::Erase { start: 0, end: 0 }),
        (&alice_tx, Message::Type { text: "H".into(), offset: 0 }),
        (&bob_tx, Message::Type { text: ", dear".into(), offset: 5 }),
    ];
    for (to, message) in script {
        let _ = to.send(message);
        thread::sleep(std::time::Duration::from_millis(20));
    }

    thread::sleep(std::time::Duration::from_millis(100));
    let _ = alice_tx.send(Message::Done);
    let _ = bob_tx.send(Message::Done);

    let alice_text = alice.join().unwrap_or_default();
    let bob_text = bob.join().unwrap_or_default();

    println!("\n--- Final ---");
    println!("Alice: {alice_text:?}");
    println!("Bob:   {bob_text:?}");
    println!("Converged: {}", alice_text == bob_text);
}
