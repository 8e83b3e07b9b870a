//! Fixed-capacity open-file handle pool
//!
//! An array-backed slot table: the handle id a host sees is the slot
//! index. A slot is either fully free or bound to exactly one open
//! resource, never partially initialized, and an id is never live for
//! two resources at once. Capacity is a compile-time constant; the pool
//! never allocates beyond it.

use parking_lot::Mutex;

use sysexfs_core::{Fid, OpenMode, FILE_HANDLE_SLOTS};

use crate::transport::ChannelId;

/// One bound slot
pub struct Slot<F> {
    pub file: F,
    pub mode: OpenMode,
    /// Next expected transfer position; advanced after each successful
    /// read or write.
    pub offset: u32,
    pub channel: ChannelId,
}

/// The global handle pool, shared by all transport channels.
pub struct HandleTable<F> {
    slots: Mutex<Vec<Option<Slot<F>>>>,
}

impl<F> HandleTable<F> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(FILE_HANDLE_SLOTS);
        slots.resize_with(FILE_HANDLE_SLOTS, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Bind the lowest free slot, returning its id. When the pool is
    /// exhausted the resource is handed back so the caller can close
    /// it.
    pub fn allocate(&self, channel: ChannelId, file: F, mode: OpenMode) -> Result<Fid, F> {
        let mut slots = self.slots.lock();
        let Some(idx) = slots.iter().position(Option::is_none) else {
            return Err(file);
        };
        slots[idx] = Some(Slot {
            file,
            mode,
            offset: 0,
            channel,
        });
        Ok(idx as Fid)
    }

    /// Free a slot, handing back its resource for the storage layer to
    /// close. Returns `None` if the id is out of range or not bound.
    pub fn release(&self, fid: Fid) -> Option<F> {
        let mut slots = self.slots.lock();
        slots
            .get_mut(fid as usize)
            .and_then(Option::take)
            .map(|slot| slot.file)
    }

    /// Run `f` against a bound slot. Returns `None` for an invalid or
    /// stale handle id.
    pub fn with_slot<R>(&self, fid: Fid, f: impl FnOnce(&mut Slot<F>) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots
            .get_mut(fid as usize)
            .and_then(Option::as_mut)
            .map(f)
    }

    /// Free every slot owned by `channel`, returning the resources.
    pub fn release_channel(&self, channel: ChannelId) -> Vec<F> {
        self.release_where(|slot| slot.channel == channel)
    }

    /// Free every slot whose owning channel fails the reachability
    /// check. Run before pool exhaustion can be observed by live
    /// channels.
    pub fn sweep(&self, reachable: impl Fn(ChannelId) -> bool) -> Vec<F> {
        self.release_where(|slot| !reachable(slot.channel))
    }

    fn release_where(&self, pred: impl Fn(&Slot<F>) -> bool) -> Vec<F> {
        let mut slots = self.slots.lock();
        let mut released = Vec::new();
        for entry in slots.iter_mut() {
            if entry.as_ref().is_some_and(&pred) {
                if let Some(slot) = entry.take() {
                    released.push(slot.file);
                }
            }
        }
        released
    }

    pub fn open_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.open_count() == FILE_HANDLE_SLOTS
    }
}

impl<F> Default for HandleTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HandleTable<u32> {
        HandleTable::new()
    }

    #[test]
    fn test_allocate_to_capacity() {
        let t = table();
        let ch = ChannelId(0);
        for i in 0..FILE_HANDLE_SLOTS {
            let fid = t.allocate(ch, i as u32, OpenMode::Read).unwrap();
            assert_eq!(fid, i as Fid);
        }
        assert!(t.is_full());

        // Exhaustion hands the resource back
        assert_eq!(t.allocate(ch, 99, OpenMode::Read), Err(99));

        // Releasing one slot restores capacity by exactly one
        assert_eq!(t.release(2), Some(2));
        assert_eq!(t.open_count(), FILE_HANDLE_SLOTS - 1);
        assert_eq!(t.allocate(ch, 100, OpenMode::Read), Ok(2));
        assert_eq!(t.allocate(ch, 101, OpenMode::Read), Err(101));
    }

    #[test]
    fn test_release_is_exactly_once() {
        let t = table();
        let fid = t.allocate(ChannelId(0), 7, OpenMode::Write).unwrap();
        assert_eq!(t.release(fid), Some(7));
        assert_eq!(t.release(fid), None);
        assert_eq!(t.release(999), None);
    }

    #[test]
    fn test_stale_id_rejected_until_reallocated() {
        let t = table();
        let fid = t.allocate(ChannelId(0), 1, OpenMode::Read).unwrap();
        t.release(fid);
        assert!(t.with_slot(fid, |_| ()).is_none());

        // Reallocation may hand the same id to a new resource
        let again = t.allocate(ChannelId(0), 2, OpenMode::Read).unwrap();
        assert_eq!(again, fid);
        assert_eq!(t.with_slot(again, |s| s.file), Some(2));
    }

    #[test]
    fn test_offset_advances_in_place() {
        let t = table();
        let fid = t.allocate(ChannelId(0), 1, OpenMode::Write).unwrap();
        t.with_slot(fid, |s| s.offset = 512);
        assert_eq!(t.with_slot(fid, |s| s.offset), Some(512));
    }

    #[test]
    fn test_release_channel() {
        let t = table();
        t.allocate(ChannelId(1), 10, OpenMode::Read).unwrap();
        t.allocate(ChannelId(2), 20, OpenMode::Read).unwrap();
        t.allocate(ChannelId(1), 11, OpenMode::Read).unwrap();

        let mut released = t.release_channel(ChannelId(1));
        released.sort_unstable();
        assert_eq!(released, vec![10, 11]);
        assert_eq!(t.open_count(), 1);
    }

    #[test]
    fn test_sweep_unreachable() {
        let t = table();
        t.allocate(ChannelId(1), 10, OpenMode::Read).unwrap();
        t.allocate(ChannelId(2), 20, OpenMode::Read).unwrap();

        let released = t.sweep(|ch| ch == ChannelId(2));
        assert_eq!(released, vec![10]);
        assert_eq!(t.open_count(), 1);
        assert_eq!(t.with_slot(1, |s| s.file), Some(20));
    }
}
