//! Triangle strip generation and the `STRP` index encoding.
//!
//! Strips use the usual zig-zag winding: triangle `i` of a strip is
//! `(s[i], s[i+1], s[i+2])` for even `i` and `(s[i+1], s[i], s[i+2])` for
//! odd `i`. On disk all strips are concatenated and the first two indices of
//! each strip carry the [`STRIP_START_FLAG`] bit.

use itertools::Itertools;

pub const STRIP_START_FLAG: u16 = 0x8000;

/// Greedily grow strips from the first remaining triangle.
///
/// Quadratic in the number of triangles.
pub fn create_triangle_strips(triangles: &[[u16; 3]]) -> Vec<Vec<u16>> {
    let mut remaining = triangles.to_vec();
    let mut strips = Vec::new();

    while !remaining.is_empty() {
        let seed = remaining.remove(0);
        let mut strip = seed.to_vec();
        let mut head = (seed[1], seed[2]);

        while let Some((index, vertex)) = find_continuation(&remaining, head, strip.len() % 2 == 0)
        {
            remaining.remove(index);
            strip.push(vertex);
            head = (head.1, vertex);
        }
        strips.push(strip);
    }
    strips
}

/// Find a triangle sharing the strip's head edge with the winding the next
/// strip position requires, returning its index and the vertex to append.
///
/// Only the three directed edges `(t0, t1)`, `(t1, t2)`, `(t2, t0)` (reversed
/// at odd positions) are tried, not every unordered vertex pair. Matching
/// `(t0, t2)` forwards would append a triangle whose winding the strip then
/// flips.
fn find_continuation(
    triangles: &[[u16; 3]],
    head: (u16, u16),
    even: bool,
) -> Option<(usize, u16)> {
    triangles
        .iter()
        .enumerate()
        .find_map(|(index, &[t0, t1, t2])| {
            let edges = if even {
                [((t0, t1), t2), ((t1, t2), t0), ((t2, t0), t1)]
            } else {
                [((t1, t0), t2), ((t2, t1), t0), ((t0, t2), t1)]
            };
            edges
                .iter()
                .find(|(edge, _)| *edge == head)
                .map(|(_, vertex)| (index, *vertex))
        })
}

/// One three-vertex strip per triangle.
pub fn degenerate_strips(triangles: &[[u16; 3]]) -> Vec<Vec<u16>> {
    triangles.iter().map(|t| t.to_vec()).collect()
}

/// Flatten strips into the on-disk index stream.
pub fn encode_strips(strips: &[Vec<u16>]) -> Vec<u16> {
    strips
        .iter()
        .flat_map(|strip| {
            strip.iter().enumerate().map(|(i, index)| {
                if i < 2 {
                    index | STRIP_START_FLAG
                } else {
                    *index
                }
            })
        })
        .collect()
}

/// Split an on-disk index stream back into strips. A strip starts wherever
/// two consecutive indices are both flagged. Strips too short to form a
/// triangle are dropped.
pub fn decode_strips(indices: &[u16]) -> Vec<Vec<u16>> {
    let flagged = |i: usize| indices[i] & STRIP_START_FLAG != 0;

    let mut starts = Vec::new();
    let mut i = 0;
    while i + 1 < indices.len() {
        if flagged(i) && flagged(i + 1) {
            starts.push(i);
            i += 2;
        } else {
            i += 1;
        }
    }
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(indices.len());

    starts
        .iter()
        .tuple_windows()
        .map(|(start, end)| {
            indices[*start..*end]
                .iter()
                .map(|index| index & !STRIP_START_FLAG)
                .collect::<Vec<_>>()
        })
        .filter(|strip| strip.len() >= 3)
        .collect()
}

/// Expand strips into triangles with alternating winding.
pub fn strips_to_triangles(strips: &[Vec<u16>]) -> Vec<[u16; 3]> {
    strips
        .iter()
        .flat_map(|strip| {
            strip
                .iter()
                .tuple_windows()
                .enumerate()
                .map(|(i, (a, b, c))| if i % 2 == 0 { [*a, *b, *c] } else { [*b, *a, *c] })
        })
        .collect()
}
