//! Cycle discovery over resolved edges.

/// Outcome of a depth-first walk over the dependency graph.
#[derive(Debug, Default)]
pub(crate) struct CycleScan {
    /// `(dependency, dependent)` pairs that close a cycle
    pub back_edges: Vec<(usize, usize)>,
    /// Node indices along each cycle, starting at the re-entered node
    pub cycles: Vec<Vec<usize>>,
}

impl CycleScan {
    pub fn is_acyclic(&self) -> bool {
        self.back_edges.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    OnStack,
    Done,
}

/// Walk `dependents` (forward edges) from every root in index order.
///
/// Removing every returned back edge leaves an acyclic graph, and since roots
/// are visited in insertion order the earliest-declared node of a cycle keeps
/// its place at the front of the schedule.
pub(crate) fn scan_cycles(dependents: &[Vec<usize>]) -> CycleScan {
    let mut marks = vec![Mark::New; dependents.len()];
    let mut scan = CycleScan::default();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..dependents.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::OnStack;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            match dependents[node].get(cursor) {
                Some(&next) => {
                    frame.1 += 1;
                    match marks[next] {
                        Mark::New => {
                            marks[next] = Mark::OnStack;
                            stack.push((next, 0));
                        }
                        Mark::OnStack => {
                            scan.back_edges.push((node, next));
                            let start = stack
                                .iter()
                                .position(|&(entry, _)| entry == next)
                                .unwrap_or(0);
                            scan.cycles
                                .push(stack[start..].iter().map(|&(entry, _)| entry).collect());
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic_chain_has_no_back_edges() {
        let dependents = vec![vec![1], vec![2], vec![]];
        let scan = scan_cycles(&dependents);
        assert!(scan.is_acyclic());
        assert!(scan.cycles.is_empty());
    }

    #[test]
    fn test_triangle_breaks_at_closing_edge() {
        // 0 -> 1 -> 2 -> 0
        let dependents = vec![vec![1], vec![2], vec![0]];
        let scan = scan_cycles(&dependents);
        assert_eq!(scan.back_edges, vec![(2, 0)]);
        assert_eq!(scan.cycles, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let dependents = vec![vec![1, 2], vec![3], vec![3], vec![]];
        assert!(scan_cycles(&dependents).is_acyclic());
    }

    #[test]
    fn test_two_disjoint_cycles() {
        let dependents = vec![vec![1], vec![0], vec![3], vec![2]];
        let scan = scan_cycles(&dependents);
        assert_eq!(scan.back_edges.len(), 2);
        assert_eq!(scan.cycles.len(), 2);
    }
}
