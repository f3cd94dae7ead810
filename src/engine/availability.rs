use crate::model::*;

/// Free sub-spans of `window` once `booked` is taken out. `booked` may be in
/// any order, may overlap, and may extend past the window.
///
/// Bookings are walked in start order with a cursor at the end of the
/// latest booked time seen so far; every gap ahead of the cursor is free.
pub fn free_windows(window: Span, booked: &[Span]) -> Vec<Span> {
    let mut starts: Vec<&Span> = booked
        .iter()
        .filter(|b| b.start < window.end && b.end > window.start)
        .collect();
    starts.sort_by_key(|b| b.start);

    let mut free = Vec::new();
    let mut cursor = window.start;
    for b in starts {
        if b.start > cursor {
            free.push(Span::new(cursor, b.start));
        }
        cursor = cursor.max(b.end);
        if cursor >= window.end {
            return free;
        }
    }
    free.push(Span::new(cursor, window.end));
    free
}
