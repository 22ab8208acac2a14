use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
};

use comms::{Flag, Key, Message, Payload, specs::table::UnroutedPolicy};
use rand::{Rng, SeedableRng, rngs::StdRng};
use worker::{
    CallbackRunner, ClientErr, HashPartitionManager, HelperThread, KvClientTable, PartitionErr,
    PartitionManager, RangePartitionManager,
};

const APP: u32 = 100;
const HELPER: u32 = 50;
const MODEL: u32 = 3;

/// Stands in for every shard: answers gets with `key * 10` and records everything else.
fn fake_shards(outbox: Receiver<Message>, replies: Sender<Message>) -> JoinHandle<Vec<Message>> {
    thread::spawn(move || {
        let mut seen = Vec::new();

        for msg in outbox {
            match msg.flag() {
                Flag::Get => {
                    let keys = msg.keys().unwrap().to_vec();
                    let vals = keys.iter().map(|&k| k as f32 * 10.).collect();
                    replies
                        .send(msg.reply(vec![Payload::Keys(keys), Payload::Values(vals)]))
                        .unwrap();
                }
                Flag::Exit => {
                    replies.send(Message::exit(HELPER)).unwrap();
                    break;
                }
                _ => seen.push(msg),
            }
        }

        seen
    })
}

struct Client {
    table: KvClientTable,
    outbox: Sender<Message>,
    shards: JoinHandle<Vec<Message>>,
    helper: JoinHandle<()>,
}

impl Client {
    fn new(partitions: Arc<dyn PartitionManager>) -> Self {
        let (outbox, shard_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let callbacks = Arc::new(CallbackRunner::new());

        let shards = fake_shards(shard_rx, reply_tx);
        let helper = HelperThread::new(HELPER, reply_rx, callbacks.clone())
            .spawn()
            .unwrap();
        let table = KvClientTable::new(APP, MODEL, outbox.clone(), partitions, callbacks);

        Self {
            table,
            outbox,
            shards,
            helper,
        }
    }

    /// Stops the fake shards and the helper, returning what the shards recorded.
    fn stop(self) -> Vec<Message> {
        self.outbox.send(Message::exit(0)).unwrap();
        let seen = self.shards.join().unwrap();
        self.helper.join().unwrap();
        seen
    }
}

fn three_ranges() -> Arc<dyn PartitionManager> {
    Arc::new(RangePartitionManager::even(&[0, 1, 2], 30, UnroutedPolicy::Reject).unwrap())
}

#[test]
fn get_gathers_every_shard() {
    let client = Client::new(three_ranges());

    let mut vals = Vec::new();
    client.table.get(&[25, 1, 12], &mut vals).unwrap();

    vals.sort_by(f32::total_cmp);
    assert_eq!(vals, vec![10., 120., 250.]);
    client.stop();
}

#[test]
fn get_aligned_follows_the_key_order() {
    let client = Client::new(three_ranges());

    let vals = client.table.get_aligned(&[25, 1, 12, 3]).unwrap();
    assert_eq!(vals, vec![250., 10., 120., 30.]);

    let vals = client.table.get_aligned(&[]).unwrap();
    assert!(vals.is_empty());
    client.stop();
}

#[test]
fn add_and_clock_reach_the_owning_shards() {
    let client = Client::new(three_ranges());

    client.table.add(&[5, 29, 6], &[0.5, 2.9, 0.6]).unwrap();
    client.table.clock().unwrap();
    let seen = client.stop();

    let adds: Vec<_> = seen
        .iter()
        .filter(|msg| msg.flag() == Flag::Add)
        .map(|msg| (msg.receiver(), msg.keys().unwrap().to_vec()))
        .collect();
    assert_eq!(adds, vec![(0, vec![5, 6]), (2, vec![29])]);

    let clocked: Vec<_> = seen
        .iter()
        .filter(|msg| msg.flag() == Flag::Clock)
        .map(|msg| (msg.sender(), msg.receiver(), msg.model_id()))
        .collect();
    assert_eq!(clocked, vec![(APP, 0, MODEL), (APP, 1, MODEL), (APP, 2, MODEL)]);
}

#[test]
fn unrouted_keys_fail_before_sending() {
    let client = Client::new(three_ranges());

    let err = client.table.add(&[1, 31], &[1.0, 1.0]).unwrap_err();
    assert_eq!(err, ClientErr::Partition(PartitionErr::UnroutedKey(31)));

    let mut vals = Vec::new();
    assert!(client.table.get(&[40], &mut vals).is_err());
    assert!(client.stop().is_empty());
}

#[test]
fn hash_partitioned_reads_cover_every_key() {
    let vnodes = NonZeroUsize::new(16).unwrap();
    let partitions = Arc::new(HashPartitionManager::new(&[0, 1, 2, 3], vnodes).unwrap());
    let client = Client::new(partitions);

    let mut rng = StdRng::seed_from_u64(7);
    let keys: Vec<Key> = (0..200).map(|_| rng.random_range(0..1_000_000)).collect();

    let vals = client.table.get_aligned(&keys).unwrap();
    let expected: Vec<f32> = keys.iter().map(|&k| k as f32 * 10.).collect();
    assert_eq!(vals, expected);
    client.stop();
}

#[test]
fn closed_outbox_keeps_reporting_disconnected() {
    let (outbox, shard_rx) = mpsc::channel();
    drop(shard_rx);

    let callbacks = Arc::new(CallbackRunner::new());
    let table = KvClientTable::new(APP, MODEL, outbox, three_ranges(), callbacks.clone());

    for _ in 0..2 {
        assert_eq!(
            table.get_aligned(&[1, 12, 25]).unwrap_err(),
            ClientErr::Disconnected
        );
    }
    assert!(!callbacks.is_in_flight(APP, MODEL));
}
