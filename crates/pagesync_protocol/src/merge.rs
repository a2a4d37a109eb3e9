//! Line-oriented three-way merge.
//!
//! Both sides are diffed against the common base (LCS per side). Hunks whose
//! base ranges overlap or touch are grouped; a group edited on one side only
//! takes that side, a group edited identically on both sides is clean, and
//! anything else is a conflict region settled by the [`ConflictStrategy`].

use crate::conflict::ConflictStrategy;
use serde::Serialize;

/// A region edited differently on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRegion {
    /// First base line of the region.
    pub base_start: usize,
    /// One past the last base line of the region.
    pub base_end: usize,
    /// Local text for the region.
    pub local: String,
    /// Remote text for the region.
    pub remote: String,
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged document.
    pub merged: String,
    /// Every conflicting region, including ones the strategy resolved.
    pub conflicts: Vec<ConflictRegion>,
}

impl MergeOutcome {
    /// Returns true if any region was edited differently on both sides.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Largest LCS table, in cells, a diff may build. Beyond it the changed
/// middle of the document becomes a single hunk.
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy)]
struct Hunk {
    base_start: usize,
    base_end: usize,
    side_start: usize,
    side_end: usize,
}

/// Merges `local` and `remote` against their common ancestor `base`.
pub fn three_way_merge(
    base: &str,
    local: &str,
    remote: &str,
    strategy: ConflictStrategy,
) -> MergeOutcome {
    let base_lines: Vec<&str> = base.split('\n').collect();
    let local_lines: Vec<&str> = local.split('\n').collect();
    let remote_lines: Vec<&str> = remote.split('\n').collect();

    let mut hunks: Vec<(Origin, Hunk)> = diff(&base_lines, &local_lines)
        .into_iter()
        .map(|h| (Origin::Local, h))
        .chain(
            diff(&base_lines, &remote_lines)
                .into_iter()
                .map(|h| (Origin::Remote, h)),
        )
        .collect();
    hunks.sort_by_key(|(origin, h)| (h.base_start, *origin));

    let mut merged: Vec<&str> = Vec::with_capacity(base_lines.len());
    let mut conflicts = Vec::new();
    let mut cursor = 0;
    let mut idx = 0;

    while idx < hunks.len() {
        let group_start = hunks[idx].1.base_start;
        let mut group_end = hunks[idx].1.base_end;
        let mut end = idx + 1;
        while end < hunks.len() && hunks[end].1.base_start <= group_end {
            group_end = group_end.max(hunks[end].1.base_end);
            end += 1;
        }
        let group = &hunks[idx..end];
        idx = end;

        merged.extend_from_slice(&base_lines[cursor..group_start]);
        cursor = group_end;

        let touched_local = group.iter().any(|(o, _)| *o == Origin::Local);
        let touched_remote = group.iter().any(|(o, _)| *o == Origin::Remote);
        let range = (group_start, group_end);
        let local_text = apply(&base_lines, &local_lines, group, Origin::Local, range);
        let remote_text = apply(&base_lines, &remote_lines, group, Origin::Remote, range);

        match (touched_local, touched_remote) {
            (true, false) => merged.extend(local_text),
            (false, true) => merged.extend(remote_text),
            _ if local_text == remote_text => merged.extend(local_text),
            _ => {
                conflicts.push(ConflictRegion {
                    base_start: group_start,
                    base_end: group_end,
                    local: local_text.join("\n"),
                    remote: remote_text.join("\n"),
                });
                match strategy {
                    ConflictStrategy::RemoteWins => merged.extend(remote_text),
                    ConflictStrategy::LocalWins
                    | ConflictStrategy::ThreeWayMerge
                    | ConflictStrategy::ConflictFile => merged.extend(local_text),
                }
            }
        }
    }
    merged.extend_from_slice(&base_lines[cursor..]);

    MergeOutcome {
        merged: merged.join("\n"),
        conflicts,
    }
}

/// Rebuilds one side's text for the base range `[start, end)`.
fn apply<'a>(
    base: &[&'a str],
    side: &[&'a str],
    group: &[(Origin, Hunk)],
    origin: Origin,
    (start, end): (usize, usize),
) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = start;
    for (_, hunk) in group.iter().filter(|(o, _)| *o == origin) {
        out.extend_from_slice(&base[pos..hunk.base_start]);
        out.extend_from_slice(&side[hunk.side_start..hunk.side_end]);
        pos = hunk.base_end;
    }
    out.extend_from_slice(&base[pos..end]);
    out
}

/// Computes the edit hunks turning `base` into `side`.
///
/// Common prefix and suffix are peeled off before the quadratic LCS pass.
/// A middle too large for [`MAX_LCS_CELLS`] is reported as one hunk, so a
/// document rewritten on both sides merges as one conflict region.
fn diff(base: &[&str], side: &[&str]) -> Vec<Hunk> {
    let prefix = base.iter().zip(side).take_while(|(a, b)| a == b).count();
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(side[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &base[prefix..base.len() - suffix];
    let b = &side[prefix..side.len() - suffix];
    let (n, m) = (a.len(), b.len());
    if n.saturating_add(1).saturating_mul(m.saturating_add(1)) > MAX_LCS_CELLS {
        return vec![Hunk {
            base_start: prefix,
            base_end: prefix + n,
            side_start: prefix,
            side_end: prefix + m,
        }];
    }

    // lcs[i * (m + 1) + j] = LCS length of a[i..] and b[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut hunks = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (mut run_i, mut run_j) = (0, 0);
    let mut push = |from_i: usize, to_i: usize, from_j: usize, to_j: usize| {
        if from_i < to_i || from_j < to_j {
            hunks.push(Hunk {
                base_start: prefix + from_i,
                base_end: prefix + to_i,
                side_start: prefix + from_j,
                side_end: prefix + to_j,
            });
        }
    };

    while i < n && j < m {
        if a[i] == b[j] {
            push(run_i, i, run_j, j);
            i += 1;
            j += 1;
            run_i = i;
            run_j = j;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    push(run_i, n, run_j, m);

    hunks
}
