use std::sync::mpsc::{self, Receiver, Sender};

use comms::{
    Flag, Message,
    specs::table::{ConsistencySpec, PartitionSpec, StorageSpec, TableSpec, UnroutedPolicy},
};
use parameter_server::{
    ModelBuilder, ServerErr, ServerThread,
    synchronization::{ConsistencyModel, Model},
};

const SERVER: u32 = 0;
const MODEL: u32 = 0;
const DRIVER: u32 = 51;
const A: u32 = 100;
const B: u32 = 101;
const C: u32 = 102;

/// A server thread fed and drained on the test's own thread.
struct Harness {
    server: ServerThread,
    inbox: Sender<Message>,
    replies: Receiver<Message>,
}

impl Harness {
    fn new(consistency: ConsistencySpec) -> Self {
        let (inbox, server_rx) = mpsc::channel();
        let (reply_tx, replies) = mpsc::channel();

        let spec = TableSpec {
            consistency,
            storage: StorageSpec::Map,
            partition: PartitionSpec::Range {
                key_space: 100,
                unrouted: UnroutedPolicy::Reject,
            },
        };

        let model = ModelBuilder::new(reply_tx)
            .build(MODEL, &spec, Some(0..100))
            .unwrap();

        let mut server = ServerThread::new(SERVER, server_rx);
        assert!(server.register_model(MODEL, model));

        Self {
            server,
            inbox,
            replies,
        }
    }

    fn push(&self, msg: Message) {
        self.inbox.send(msg).unwrap();
    }

    /// Processes everything queued so far.
    fn drain(&mut self) {
        self.push(Message::exit(SERVER));
        self.server.run().unwrap();
    }

    fn reset(&mut self, tids: Vec<u32>) {
        self.push(Message::reset_worker(DRIVER, SERVER, MODEL, tids));
        self.drain();

        let ack = self.replies.try_recv().unwrap();
        assert_eq!(ack.flag(), Flag::ResetWorker);
        assert_eq!(ack.receiver(), DRIVER);
    }

    fn add(&self, tid: u32, key: u64, val: f32) {
        self.push(Message::add(tid, SERVER, MODEL, vec![key], vec![val]));
    }

    fn get(&self, tid: u32, key: u64) {
        self.push(Message::get(tid, SERVER, MODEL, vec![key]));
    }

    fn clock(&self, tid: u32) {
        self.push(Message::clock(tid, SERVER, MODEL));
    }

    /// Returns the `(receiver, value)` of every reply sent so far.
    fn answers(&self) -> Vec<(u32, f32)> {
        self.replies
            .try_iter()
            .map(|reply| (reply.receiver(), reply.values().unwrap()[0]))
            .collect()
    }

    fn model(&self) -> &Model {
        self.server.model(MODEL).unwrap()
    }
}

#[test]
fn bsp_hides_adds_until_every_thread_clocks() {
    let mut h = Harness::new(ConsistencySpec::Bsp);
    h.reset(vec![A, B]);

    h.add(A, 7, 1.0);
    h.clock(A);
    h.get(B, 7);
    h.get(A, 7);
    h.drain();

    // B is at the barrier and reads the old value, A is ahead and must wait.
    assert_eq!(h.answers(), vec![(B, 0.0)]);
    let Model::Bsp(bsp) = h.model() else {
        panic!("expected a bsp model");
    };
    assert_eq!(bsp.pending_adds(), 1);
    assert_eq!(bsp.pending_gets(), 1);

    h.clock(B);
    h.drain();

    assert_eq!(h.answers(), vec![(A, 1.0)]);
    assert_eq!(h.model().min_clock(), 1);

    h.get(B, 7);
    h.drain();
    assert_eq!(h.answers(), vec![(B, 1.0)]);
}

#[test]
fn ssp_replays_requests_once_the_bound_allows_them() {
    let mut h = Harness::new(ConsistencySpec::Ssp { staleness: 2 });
    h.reset(vec![A, B]);

    for _ in 0..3 {
        h.clock(A);
    }
    h.add(A, 3, 4.0);
    h.get(A, 3);
    h.drain();

    let Model::Ssp(ssp) = h.model() else {
        panic!("expected an ssp model");
    };
    assert_eq!(h.model().progress(A), Some(3));
    assert_eq!(ssp.pending_size(1), 2);
    assert!(h.answers().is_empty());

    h.clock(B);
    h.drain();

    assert_eq!(h.model().min_clock(), 1);
    assert_eq!(h.answers(), vec![(A, 4.0)]);
}

#[test]
fn asp_reads_see_adds_right_away() {
    let mut h = Harness::new(ConsistencySpec::Asp);
    h.reset(vec![A, B]);

    h.clock(B);
    h.clock(B);
    h.add(A, 1, 2.5);
    h.get(A, 1);
    h.get(B, 1);
    h.drain();

    assert_eq!(h.answers(), vec![(A, 2.5), (B, 2.5)]);
}

#[test]
fn reset_zeroes_previous_progress() {
    let mut h = Harness::new(ConsistencySpec::Ssp { staleness: 1 });
    h.reset(vec![A, B, C]);

    for tid in [A, B, C, A, B, C] {
        h.clock(tid);
    }
    h.drain();
    assert_eq!(h.model().min_clock(), 2);

    h.reset(vec![A, B]);

    assert_eq!(h.model().min_clock(), 0);
    assert_eq!(h.model().progress(A), Some(0));
    assert_eq!(h.model().progress(B), Some(0));
    assert_eq!(h.model().progress(C), None);
}

#[test]
fn unregistered_threads_are_discarded_and_counted() {
    let mut h = Harness::new(ConsistencySpec::Asp);
    h.reset(vec![A]);

    h.add(C, 1, 1.0);
    h.get(C, 1);
    h.get(A, 1);
    h.drain();

    assert_eq!(h.answers(), vec![(A, 0.0)]);
    assert_eq!(h.model().rejected(), 2);
}

#[test]
fn unknown_model_stops_the_server() {
    let (inbox, server_rx) = mpsc::channel();
    let mut server = ServerThread::new(SERVER, server_rx);

    inbox.send(Message::clock(A, SERVER, 9)).unwrap();

    assert_eq!(
        server.run(),
        Err(ServerErr::UnknownModel {
            server: SERVER,
            model_id: 9
        })
    );
}

#[test]
fn spawned_server_stops_on_exit() {
    let (inbox, server_rx) = mpsc::channel();
    let server = ServerThread::new(SERVER, server_rx);

    let handle = server.spawn().unwrap();
    inbox.send(Message::exit(SERVER)).unwrap();

    assert!(handle.join().unwrap().is_ok());
}
