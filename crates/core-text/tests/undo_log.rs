use core_text::{LineId, MAX_UNDO, Ring, RingError};
use pretty_assertions::assert_eq;

fn numbered(count: usize) -> (Ring, Vec<LineId>) {
    let mut ring = Ring::default();
    let mut after = ring.top();
    let mut ids = Vec::new();
    for n in 0..count {
        let id = ring.insert_line(after).unwrap();
        ring.set_text(id, n.to_string().as_bytes()).unwrap();
        ids.push(id);
        after = id;
    }
    (ring, ids)
}

fn texts(ring: &Ring) -> Vec<String> {
    ring.data_lines()
        .map(|(_, line)| String::from_utf8_lossy(ring.text_of(line)).into_owned())
        .collect()
}

#[test]
fn oldest_slots_are_evicted_beyond_capacity() {
    let (mut ring, ids) = numbered(10);
    // Remove lines 1, 3, 5, 7 and 8 one at a time: five soft removals.
    for index in [1, 3, 5, 7, 8] {
        ring.remove_lines_with_undo(ids[index], ids[index], &mut ())
            .unwrap();
    }
    assert_eq!(ring.undo_depth(), MAX_UNDO);
    assert!(ring.get(ids[1]).is_none(), "oldest slot was destroyed");
    assert_eq!(texts(&ring), vec!["0", "2", "4", "6", "9"]);
    ring.check().unwrap();

    for expected in [ids[8], ids[7], ids[5], ids[3]] {
        let (head, tail) = ring.undo().unwrap();
        assert_eq!((head, tail), (expected, expected));
        ring.check().unwrap();
    }
    assert_eq!(
        texts(&ring),
        vec!["0", "2", "3", "4", "5", "6", "7", "8", "9"]
    );
    assert!(matches!(ring.undo(), Err(RingError::CannotUndo)));
}

#[test]
fn multi_line_runs_return_in_order() {
    let (mut ring, ids) = numbered(6);
    ring.remove_lines_with_undo(ids[1], ids[2], &mut ()).unwrap();
    ring.remove_lines_with_undo(ids[3], ids[4], &mut ()).unwrap();
    assert_eq!(texts(&ring), vec!["0", "5"]);
    assert_eq!(ring.rows(), 4);
    ring.undo().unwrap();
    assert_eq!(texts(&ring), vec!["0", "3", "4", "5"]);
    ring.undo().unwrap();
    assert_eq!(texts(&ring), vec!["0", "1", "2", "3", "4", "5"]);
    assert_eq!(ring.row_number(ids[4]), Some(5));
    ring.check().unwrap();
}

#[test]
fn evicted_text_returns_to_pool() {
    let (mut ring, ids) = numbered(MAX_UNDO + 2);
    let live_before = ring.pool().stats().live;
    for id in ids.iter().take(MAX_UNDO + 1) {
        ring.remove_lines_with_undo(*id, *id, &mut ()).unwrap();
    }
    // Exactly one slot was evicted; its 16-byte block is back in the pool.
    assert_eq!(ring.pool().stats().live, live_before - 16);
    ring.reset_undo();
    assert_eq!(ring.pool().stats().live, 16);
    ring.check().unwrap();
}
