//! Lock-free multi-producer, multi-consumer telemetry ring buffer.
//!
//! [`TelemetryRingBuffer`] is a fixed-capacity circular queue in the style of
//! Vyukov's bounded MPMC queue, changed so that producers never wait for
//! consumers: when the buffer is full the oldest unread sample is overwritten.
//!
//! # Slot protocol
//!
//! Two monotonically increasing counters hand out logical positions. Position
//! `p` lives in slot `p & (capacity - 1)`. Each slot carries one atomic
//! sequence word packing the position that currently owns the slot together
//! with one of four states:
//!
//! ```text
//! EMPTY(p)  ──writer p──▶ WRITING(p) ──▶ READY(p) ──reader p──▶ READING(p) ──▶ EMPTY(p + C)
//!                                          │  ▲
//!                                          │  └── snapshot clones and restores READY(p)
//!                                          └───── writer q > p takes over (sample p lost)
//! ```
//!
//! The payload is touched only by the thread that moved the slot into
//! `WRITING` or `READING`; every such move is a compare-exchange with
//! `Acquire` and every release is a `Release` store. A party that finds the
//! slot owned by a newer position knows its own position has been overwritten
//! and gives up on it. Waits only happen while another thread holds the slot,
//! so they are bounded by a single in-flight copy.
//!
//! # Example
//!
//! ```
//! use flightwatch::ring::TelemetryRingBuffer;
//!
//! let ring = TelemetryRingBuffer::new(4);
//! for i in 0..6 {
//!     ring.write(i);
//! }
//!
//! // The two oldest samples were overwritten.
//! assert_eq!(ring.read_all(), vec![2, 3, 4, 5]);
//! assert_eq!(ring.overwritten(), 2);
//! ```

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::hint;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_utils::{Backoff, CachePadded};
use serde::{Deserialize, Serialize};

const STATE_BITS: u32 = 2;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

const EMPTY: u64 = 0;
const WRITING: u64 = 1;
const READY: u64 = 2;
const READING: u64 = 3;

#[inline]
const fn stamp(position: u64, state: u64) -> u64 {
    (position << STATE_BITS) | state
}

#[inline]
const fn owner(sequence: u64) -> u64 {
    sequence >> STATE_BITS
}

#[inline]
const fn state(sequence: u64) -> u64 {
    sequence & STATE_MASK
}

/// How a thread waits while another thread holds the slot it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinPolicy {
    /// Pure busy spin with a CPU pause hint.
    Busy,
    /// Exponential backoff that falls back to yielding under long waits.
    #[default]
    Backoff,
    /// Yield to the OS scheduler on every iteration.
    Yield,
}

struct Spinner {
    policy: SpinPolicy,
    backoff: Backoff,
}

impl Spinner {
    fn new(policy: SpinPolicy) -> Self {
        Self {
            policy,
            backoff: Backoff::new(),
        }
    }

    fn wait(&self) {
        match self.policy {
            SpinPolicy::Busy => hint::spin_loop(),
            SpinPolicy::Backoff => self.backoff.snooze(),
            SpinPolicy::Yield => thread::yield_now(),
        }
    }
}

struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Restores a slot to `READY` when a snapshot clone finishes or unwinds.
struct RestoreReady<'a> {
    sequence: &'a AtomicU64,
    position: u64,
}

impl Drop for RestoreReady<'_> {
    fn drop(&mut self) {
        self.sequence
            .store(stamp(self.position, READY), Ordering::Release);
    }
}

/// Point-in-time occupancy figures for a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferStats {
    /// Fixed capacity.
    pub capacity: usize,
    /// Unread samples.
    pub len: usize,
    /// `len / capacity`.
    pub utilization: f64,
    /// Samples written since creation.
    pub total_written: u64,
    /// Samples lost to overwrite since creation.
    pub overwritten: u64,
}

/// Fixed-capacity lock-free MPMC ring buffer that overwrites the oldest unread
/// element when full.
///
/// Share it between threads with `Arc`. All operations except [`reset`]
/// take `&self` and never block on a lock.
///
/// [`reset`]: TelemetryRingBuffer::reset
pub struct TelemetryRingBuffer<T> {
    write_idx: CachePadded<AtomicU64>,
    read_idx: CachePadded<AtomicU64>,
    overwritten: CachePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    mask: u64,
    spin: SpinPolicy,
}

// SAFETY: payloads are only accessed by the single thread holding the slot in
// WRITING or READING, so values move between threads but are never shared.
unsafe impl<T: Send> Send for TelemetryRingBuffer<T> {}
// SAFETY: see above; `&self` operations synchronize through the sequence words.
unsafe impl<T: Send> Sync for TelemetryRingBuffer<T> {}

impl<T> TelemetryRingBuffer<T> {
    /// Create a ring buffer with the default [`SpinPolicy`].
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_spin_policy(capacity, SpinPolicy::default())
    }

    /// Create a ring buffer that waits according to `spin`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    #[must_use]
    pub fn with_spin_policy(capacity: usize, spin: SpinPolicy) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring buffer capacity must be a power of two, got {capacity}"
        );

        let slots = (0..capacity as u64)
            .map(|position| Slot {
                sequence: AtomicU64::new(stamp(position, EMPTY)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            write_idx: CachePadded::new(AtomicU64::new(0)),
            read_idx: CachePadded::new(AtomicU64::new(0)),
            overwritten: CachePadded::new(AtomicU64::new(0)),
            slots,
            mask: capacity as u64 - 1,
            spin,
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, position: u64) -> &Slot<T> {
        &self.slots[(position & self.mask) as usize]
    }

    #[inline]
    fn capacity_u64(&self) -> u64 {
        self.mask + 1
    }

    /// Append a sample.
    ///
    /// Always succeeds. If the buffer is full the oldest unread sample is
    /// dropped; [`overwritten`](Self::overwritten) counts such losses.
    pub fn write(&self, value: T) {
        let position = self.write_idx.fetch_add(1, Ordering::AcqRel);
        let slot = self.slot(position);
        let spinner = Spinner::new(self.spin);

        loop {
            let sequence = slot.sequence.load(Ordering::Acquire);
            let current = owner(sequence);

            if current > position {
                // A newer writer already took this slot; our sample is the
                // older one and is discarded.
                self.overwritten.fetch_add(1, Ordering::Relaxed);
                return;
            }

            match state(sequence) {
                st @ (EMPTY | READY) => {
                    if slot
                        .sequence
                        .compare_exchange(
                            sequence,
                            stamp(position, WRITING),
                            Ordering::Acquire,
                            Ordering::Relaxed,
                        )
                        .is_err()
                    {
                        continue;
                    }

                    // SAFETY: the slot is held in WRITING by this thread. A
                    // READY slot is initialized; an EMPTY one is not.
                    let previous = unsafe {
                        let cell = &mut *slot.value.get();
                        let previous = if st == READY {
                            Some(cell.assume_init_read())
                        } else {
                            None
                        };
                        cell.write(value);
                        previous
                    };
                    slot.sequence
                        .store(stamp(position, READY), Ordering::Release);

                    if previous.is_some() {
                        self.overwritten.fetch_add(1, Ordering::Relaxed);
                    }
                    // Dropped outside the critical section.
                    drop(previous);
                    return;
                }
                _ => spinner.wait(),
            }
        }
    }

    /// Remove and return the oldest unread sample, or `None` if empty.
    pub fn read(&self) -> Option<T> {
        let capacity = self.capacity_u64();

        loop {
            let read = self.read_idx.load(Ordering::Acquire);
            let write = self.write_idx.load(Ordering::Acquire);
            if read >= write {
                return None;
            }

            if write - read > capacity {
                // Lapped by producers: skip positions that can no longer be
                // held in the buffer.
                let _ = self.read_idx.compare_exchange(
                    read,
                    write - capacity,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
                continue;
            }

            if self
                .read_idx
                .compare_exchange_weak(read, read + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            if let Some(value) = self.take(read) {
                return Some(value);
            }
        }
    }

    /// Consume position `position`, or return `None` if it was overwritten.
    fn take(&self, position: u64) -> Option<T> {
        let slot = self.slot(position);
        let spinner = Spinner::new(self.spin);
        let ready = stamp(position, READY);

        loop {
            let sequence = slot.sequence.load(Ordering::Acquire);
            if owner(sequence) > position {
                return None;
            }

            if sequence == ready {
                if slot
                    .sequence
                    .compare_exchange(
                        ready,
                        stamp(position, READING),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_err()
                {
                    continue;
                }

                // SAFETY: READY implies initialized, and READING gives this
                // thread exclusive access until the store below.
                let value = unsafe { (*slot.value.get()).assume_init_read() };
                slot.sequence.store(
                    stamp(position + self.capacity_u64(), EMPTY),
                    Ordering::Release,
                );
                return Some(value);
            }

            // The writer for this position (or a reader of the previous lap)
            // is still in flight.
            spinner.wait();
        }
    }

    /// Remove up to `max` samples in FIFO order.
    #[must_use]
    pub fn read_batch(&self, max: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(max.min(self.len()));
        self.drain_into(&mut out, max);
        out
    }

    /// Remove up to `max` samples, appending them to `out`. Returns how many
    /// were appended.
    pub fn drain_into(&self, out: &mut Vec<T>, max: usize) -> usize {
        let mut count = 0;
        while count < max {
            match self.read() {
                Some(value) => {
                    out.push(value);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Remove every unread sample, bounded by one buffer's worth so that
    /// continuous producers cannot keep the caller here forever.
    #[must_use]
    pub fn read_all(&self) -> Vec<T> {
        self.read_batch(self.capacity())
    }

    /// Fixed capacity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn capacity(&self) -> usize {
        self.capacity_u64() as usize
    }

    /// Number of unread samples at the instant of the counter loads.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> usize {
        let read = self.read_idx.load(Ordering::Acquire);
        let write = self.write_idx.load(Ordering::Acquire);
        write.saturating_sub(read).min(self.capacity_u64()) as usize
    }

    /// Whether there is no unread sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the next write will overwrite an unread sample.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Fraction of capacity holding unread samples, `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Samples written since creation (or claimed by in-flight writers).
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.write_idx.load(Ordering::Acquire)
    }

    /// Read cursor position: samples consumed or skipped since creation.
    #[must_use]
    pub fn total_read(&self) -> u64 {
        self.read_idx.load(Ordering::Acquire)
    }

    /// Samples lost to overwrite since creation.
    #[must_use]
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Occupancy figures for logging and monitoring.
    #[must_use]
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.capacity(),
            len: self.len(),
            utilization: self.utilization(),
            total_written: self.total_written(),
            overwritten: self.overwritten(),
        }
    }

    /// Discard all unread samples and re-arm every slot.
    ///
    /// Takes `&mut self`: no writer or reader can be active, which is the
    /// precondition for re-initializing the sequence words. For a buffer
    /// shared through `Arc`, obtain exclusive access with `Arc::get_mut`
    /// once all producer and consumer handles are gone.
    pub fn reset(&mut self) {
        self.drop_ready();

        let write = *self.write_idx.get_mut();
        let capacity = self.capacity_u64();
        for position in write..write + capacity {
            #[allow(clippy::cast_possible_truncation)]
            let index = (position & self.mask) as usize;
            *self.slots[index].sequence.get_mut() = stamp(position, EMPTY);
        }
        *self.read_idx.get_mut() = write;
    }

    fn drop_ready(&mut self) {
        for slot in self.slots.iter_mut() {
            let sequence = slot.sequence.get_mut();
            if state(*sequence) == READY {
                // SAFETY: exclusive access, and READY implies initialized.
                unsafe { slot.value.get_mut().assume_init_drop() };
                *sequence = stamp(owner(*sequence), EMPTY);
            }
        }
    }
}

impl<T: Clone> TelemetryRingBuffer<T> {
    /// Copy the newest `count` unread samples, oldest first, without
    /// consuming them. Samples still being written are skipped.
    #[must_use]
    pub fn snapshot(&self, count: usize) -> Vec<T> {
        let read = self.read_idx.load(Ordering::Acquire);
        let write = self.write_idx.load(Ordering::Acquire);
        let start = read
            .max(write.saturating_sub(self.capacity_u64()))
            .max(write.saturating_sub(count as u64));

        (start..write)
            .filter_map(|position| self.peek(position))
            .collect()
    }

    /// Copy every unread sample without consuming them.
    #[must_use]
    pub fn all_data(&self) -> Vec<T> {
        self.snapshot(self.capacity())
    }

    fn peek(&self, position: u64) -> Option<T> {
        let slot = self.slot(position);
        let spinner = Spinner::new(self.spin);
        let ready = stamp(position, READY);
        let reading = stamp(position, READING);

        loop {
            match slot.sequence.compare_exchange(
                ready,
                reading,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let _restore = RestoreReady {
                        sequence: &slot.sequence,
                        position,
                    };
                    // SAFETY: READY implies initialized; READING keeps
                    // writers and readers out until `_restore` drops.
                    return Some(unsafe { (*slot.value.get()).assume_init_ref().clone() });
                }
                // Another snapshot or a reader holds it; a snapshot will put
                // it back, a reader will consume it.
                Err(current) if current == reading => spinner.wait(),
                Err(_) => return None,
            }
        }
    }
}

impl<T> Drop for TelemetryRingBuffer<T> {
    fn drop(&mut self) {
        self.drop_ready();
    }
}

impl<T> fmt::Debug for TelemetryRingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryRingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("overwritten", &self.overwritten())
            .field("spin", &self.spin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use proptest::prelude::*;

    #[test]
    fn test_new_ring_is_empty() {
        let ring: TelemetryRingBuffer<u32> = TelemetryRingBuffer::new(8);
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.len(), 0);
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert!(ring.read().is_none());
        assert!(ring.utilization().abs() < f64::EPSILON);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_non_power_of_two_capacity_panics() {
        let _ring: TelemetryRingBuffer<u32> = TelemetryRingBuffer::new(12);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_zero_capacity_panics() {
        let _ring: TelemetryRingBuffer<u32> = TelemetryRingBuffer::new(0);
    }

    #[test]
    fn test_fifo_without_overflow() {
        let ring = TelemetryRingBuffer::new(16);
        for i in 0..16 {
            ring.write(i);
        }
        assert!(ring.is_full());
        assert!((ring.utilization() - 1.0).abs() < f64::EPSILON);

        let values: Vec<i32> = std::iter::from_fn(|| ring.read()).collect();
        assert_eq!(values, (0..16).collect::<Vec<_>>());
        assert_eq!(ring.overwritten(), 0);
    }

    #[test]
    fn test_overwrite_keeps_newest() {
        let ring = TelemetryRingBuffer::new(8);
        for i in 0..13 {
            ring.write(i);
        }
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.overwritten(), 5);
        assert_eq!(ring.read_all(), (5..13).collect::<Vec<_>>());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_interleaved_read_write_across_laps() {
        let ring = TelemetryRingBuffer::new(4);
        let mut expected = Vec::new();
        let mut actual = Vec::new();
        for i in 0..50 {
            ring.write(i);
            expected.push(i);
            if i % 3 == 0 {
                actual.extend(ring.read());
            }
        }
        actual.extend(ring.read_all());
        assert_eq!(ring.overwritten(), 0);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_read_batch_respects_max() {
        let ring = TelemetryRingBuffer::new(8);
        for i in 0..6 {
            ring.write(i);
        }
        assert_eq!(ring.read_batch(4), vec![0, 1, 2, 3]);
        assert_eq!(ring.read_batch(4), vec![4, 5]);
        assert!(ring.read_batch(4).is_empty());
    }

    #[test]
    fn test_drain_into_appends() {
        let ring = TelemetryRingBuffer::new(8);
        ring.write(1);
        ring.write(2);
        let mut out = vec![0];
        assert_eq!(ring.drain_into(&mut out, 10), 2);
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let ring = TelemetryRingBuffer::new(8);
        for i in 0..5 {
            ring.write(i);
        }
        assert_eq!(ring.snapshot(3), vec![2, 3, 4]);
        assert_eq!(ring.all_data(), vec![0, 1, 2, 3, 4]);
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.read(), Some(0));
        assert_eq!(ring.all_data(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_snapshot_after_overwrite() {
        let ring = TelemetryRingBuffer::new(4);
        for i in 0..10 {
            ring.write(i);
        }
        assert_eq!(ring.all_data(), vec![6, 7, 8, 9]);
        assert_eq!(ring.snapshot(100), vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_reset_discards_unread() {
        let mut ring = TelemetryRingBuffer::new(4);
        for i in 0..6 {
            ring.write(i);
        }
        ring.reset();
        assert!(ring.is_empty());
        assert!(ring.read().is_none());

        ring.write(42);
        ring.write(43);
        assert_eq!(ring.read_all(), vec![42, 43]);
        assert_eq!(ring.total_written(), 8);
    }

    #[test]
    fn test_stats() {
        let ring = TelemetryRingBuffer::new(4);
        for i in 0..6 {
            ring.write(i);
        }
        let stats = ring.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.len, 4);
        assert_eq!(stats.total_written, 6);
        assert_eq!(stats.overwritten, 2);
    }

    #[test]
    fn test_debug_output() {
        let ring: TelemetryRingBuffer<u8> = TelemetryRingBuffer::new(2);
        let debug_str = format!("{ring:?}");
        assert!(debug_str.contains("TelemetryRingBuffer"));
        assert!(debug_str.contains("capacity"));
    }

    #[test]
    fn test_spin_policy_default() {
        assert_eq!(SpinPolicy::default(), SpinPolicy::Backoff);
    }

    #[derive(Debug, Clone)]
    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_every_value_dropped_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let mut ring = TelemetryRingBuffer::new(4);
            for _ in 0..10 {
                ring.write(Counted(drops.clone()));
            }
            // 6 overwritten
            assert_eq!(drops.load(Ordering::SeqCst), 6);

            let one = ring.read();
            drop(one);
            assert_eq!(drops.load(Ordering::SeqCst), 7);

            let copies = ring.all_data();
            drop(copies);
            assert_eq!(drops.load(Ordering::SeqCst), 10);

            ring.reset();
            assert_eq!(drops.load(Ordering::SeqCst), 13);

            ring.write(Counted(drops.clone()));
        }
        // The last write is dropped with the buffer.
        assert_eq!(drops.load(Ordering::SeqCst), 14);
    }

    fn run_concurrent(capacity: usize, producers: u64, per_producer: u64, consumers: usize) {
        let ring = Arc::new(TelemetryRingBuffer::new(capacity));
        let done = Arc::new(AtomicUsize::new(0));

        let producer_handles: Vec<_> = (0..producers)
            .map(|p| {
                let ring = Arc::clone(&ring);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        ring.write(p * per_producer + i);
                    }
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let consumer_handles: Vec<_> = (0..consumers)
            .map(|_| {
                let ring = Arc::clone(&ring);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        let finished = done.load(Ordering::SeqCst) == producers as usize;
                        match ring.read() {
                            Some(v) => seen.push(v),
                            None if finished => break,
                            None => thread::yield_now(),
                        }
                    }
                    seen
                })
            })
            .collect();

        for handle in producer_handles {
            handle.join().unwrap();
        }
        let mut all = Vec::new();
        for handle in consumer_handles {
            all.extend(handle.join().unwrap());
        }

        let total = producers * per_producer;
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len(), "a sample was read twice");
        assert!(all.len() as u64 <= total);
        assert!(all.iter().all(|v| *v < total));
        assert_eq!(all.len() as u64 + ring.overwritten(), total);
    }

    #[test]
    fn test_concurrent_accounting_no_overflow() {
        run_concurrent(1 << 14, 4, 2_000, 3);
    }

    #[test]
    fn test_concurrent_accounting_with_overwrite() {
        run_concurrent(16, 4, 5_000, 2);
    }

    #[test]
    fn test_per_producer_order_preserved_single_consumer() {
        let ring = Arc::new(TelemetryRingBuffer::new(1 << 12));
        let handles: Vec<_> = (0..3u64)
            .map(|p| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..1_000u64 {
                        ring.write((p, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let values = ring.read_all();
        assert_eq!(values.len(), 3_000);
        for p in 0..3u64 {
            let seq: Vec<u64> = values.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..1_000).collect::<Vec<_>>());
        }
    }

    proptest! {
        #[test]
        fn prop_fifo_when_within_capacity(values in proptest::collection::vec(any::<i64>(), 0..64)) {
            let ring = TelemetryRingBuffer::new(64);
            for v in &values {
                ring.write(*v);
            }
            prop_assert_eq!(ring.read_all(), values);
        }

        #[test]
        fn prop_overflow_keeps_last_capacity(extra in 1usize..100, shift in 0u32..5) {
            let capacity = 1usize << shift;
            let ring = TelemetryRingBuffer::new(capacity);
            let total = capacity + extra;
            for v in 0..total {
                ring.write(v);
            }
            prop_assert_eq!(ring.read_all(), (extra..total).collect::<Vec<_>>());
            prop_assert_eq!(ring.overwritten(), extra as u64);
        }
    }
}
