use crate::{LineId, Ring};

/// Receives notice of structural changes to a ring.
///
/// Removal notices arrive before the lines are detached, so every id in
/// `head..=tail` still resolves and `ring.next(tail)` is the line that will
/// follow the gap.
pub trait LineObserver {
    fn lines_removing(&mut self, _ring: &Ring, _head: LineId, _tail: LineId) {}

    /// Text or flags of `head..=tail` changed in place.
    fn lines_changed(&mut self, _ring: &Ring, _head: LineId, _tail: LineId) {}

    fn ring_removing(&mut self, _ring: &Ring) {}
}

impl LineObserver for () {}

impl<A, B> LineObserver for (&mut A, &mut B)
where
    A: LineObserver + ?Sized,
    B: LineObserver + ?Sized,
{
    fn lines_removing(&mut self, ring: &Ring, head: LineId, tail: LineId) {
        self.0.lines_removing(ring, head, tail);
        self.1.lines_removing(ring, head, tail);
    }

    fn lines_changed(&mut self, ring: &Ring, head: LineId, tail: LineId) {
        self.0.lines_changed(ring, head, tail);
        self.1.lines_changed(ring, head, tail);
    }

    fn ring_removing(&mut self, ring: &Ring) {
        self.0.ring_removing(ring);
        self.1.ring_removing(ring);
    }
}
