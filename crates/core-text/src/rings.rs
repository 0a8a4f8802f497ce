use crate::{FileSystem, LineObserver, Ring, RingError, RingId};
use std::path::Path;
use tracing::debug;

/// Open rings in display order.
#[derive(Debug, Default)]
pub struct Rings {
    rings: Vec<Ring>,
}

impl Rings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ring: Ring) -> RingId {
        let id = ring.id();
        self.rings.push(ring);
        id
    }

    /// Insert `ring` right after `after`, or at the end if `after` is unknown.
    pub fn insert_after(&mut self, after: RingId, ring: Ring) -> RingId {
        let id = ring.id();
        match self.position(after) {
            Some(index) => self.rings.insert(index + 1, ring),
            None => self.rings.push(ring),
        }
        id
    }

    fn position(&self, id: RingId) -> Option<usize> {
        self.rings.iter().position(|ring| ring.id() == id)
    }

    pub fn get(&self, id: RingId) -> Option<&Ring> {
        self.rings.iter().find(|ring| ring.id() == id)
    }

    pub fn get_mut(&mut self, id: RingId) -> Option<&mut Ring> {
        self.rings.iter_mut().find(|ring| ring.id() == id)
    }

    pub fn ring(&self, id: RingId) -> Result<&Ring, RingError> {
        self.get(id).ok_or(RingError::UnknownRing(id))
    }

    pub fn ring_mut(&mut self, id: RingId) -> Result<&mut Ring, RingError> {
        self.get_mut(id).ok_or(RingError::UnknownRing(id))
    }

    /// Remove a ring, telling `observer` first.
    pub fn remove(&mut self, id: RingId, observer: &mut dyn LineObserver) -> Option<Ring> {
        let index = self.position(id)?;
        observer.ring_removing(&self.rings[index]);
        let ring = self.rings.remove(index);
        debug!(target: "ring", ring = ?id, remaining = self.rings.len(), "ring_removed");
        Some(ring)
    }

    /// The ring loaded from `path`, if any.
    pub fn find_path(&self, fs: &dyn FileSystem, path: &Path) -> Option<RingId> {
        self.rings
            .iter()
            .find(|ring| ring.contains(fs, path))
            .map(Ring::id)
    }

    /// Ring following `id` in order, wrapping around.
    pub fn next_after(&self, id: RingId) -> Option<RingId> {
        let index = self.position(id)?;
        let next = (index + 1) % self.rings.len();
        (next != index).then(|| self.rings[next].id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ring> {
        self.rings.iter()
    }

    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Seen(Vec<RingId>);

    impl LineObserver for Seen {
        fn ring_removing(&mut self, ring: &Ring) {
            self.0.push(ring.id());
        }
    }

    #[test]
    fn insert_after_keeps_order() {
        let mut rings = Rings::new();
        let a = rings.push(Ring::default());
        let c = rings.push(Ring::default());
        let b = rings.insert_after(a, Ring::default());
        let order: Vec<RingId> = rings.iter().map(Ring::id).collect();
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(rings.next_after(c), Some(a));
    }

    #[test]
    fn remove_notifies_observer() {
        let mut rings = Rings::new();
        let a = rings.push(Ring::default());
        let mut seen = Seen::default();
        assert!(rings.remove(a, &mut seen).is_some());
        assert_eq!(seen.0, vec![a]);
        assert!(rings.is_empty());
        assert!(matches!(rings.ring(a), Err(RingError::UnknownRing(_))));
    }
}
