use std::collections::{BTreeSet, HashMap, HashSet};

/// Access to the fields a summary computation needs. Implemented by the
/// transaction type so this crate does not depend on it.
pub trait Summarisable {
    fn tx_id(&self) -> &str;
    /// Colon-separated input tokens.
    fn input(&self) -> &str;
    /// Colon-separated output tokens.
    fn output(&self) -> &str;
}

impl<T: Summarisable> Summarisable for &T {
    fn tx_id(&self) -> &str {
        (*self).tx_id()
    }
    fn input(&self) -> &str {
        (*self).input()
    }
    fn output(&self) -> &str {
        (*self).output()
    }
}

fn token_sets<T: Summarisable>(txs: &[T]) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut ins: BTreeSet<String> = BTreeSet::new();
    let mut outs: BTreeSet<String> = BTreeSet::new();
    for tx in txs {
        ins.extend(tx.input().split(':').map(str::to_owned));
        outs.extend(tx.output().split(':').map(str::to_owned));
    }
    let net_ins = ins.difference(&outs).cloned().collect();
    let net_outs = outs.difference(&ins).cloned().collect();
    (net_ins, net_outs)
}

/// Net inputs and outputs of a transaction set: tokens consumed but never
/// produced, and tokens produced but never consumed. Returned sorted; only
/// set-level equality is meaningful to callers.
pub fn summary<T: Summarisable>(txs: &[T]) -> (Vec<String>, Vec<String>) {
    let (ins, outs) = token_sets(txs);
    (ins.into_iter().collect(), outs.into_iter().collect())
}

/// Determine a traversal order of a summarised chain by linking each
/// transaction's outputs to the inputs of the next, starting from the net
/// input set, and return the shortest id prefix that is unique across the
/// ordered transactions. A display aid for reading `summarised` records.
pub fn order_prefixes<T: Summarisable>(txs: &[T]) -> Vec<String> {
    let (net_ins, _) = token_sets(txs);

    let mut by_input: HashMap<&str, &T> = HashMap::new();
    for tx in txs {
        for token in tx.input().split(':') {
            by_input.insert(token, tx);
        }
    }

    let mut to_visit: Vec<&T> = net_ins
        .iter()
        .filter_map(|token| by_input.get(token.as_str()).copied())
        .collect();
    let mut ordered: Vec<&T> = Vec::with_capacity(txs.len());
    let mut seen: HashSet<&str> = HashSet::new();
    let mut i = 0;
    while i < to_visit.len() {
        let tx = to_visit[i];
        i += 1;
        if !seen.insert(tx.tx_id()) {
            continue;
        }
        ordered.push(tx);
        let mut insert_at = i;
        for token in tx.output().split(':') {
            if let Some(&next) = by_input.get(token) {
                to_visit.insert(insert_at, next);
                insert_at += 1;
            }
        }
    }

    // Grow the prefix until every ordered id is distinguishable.
    let max_len = ordered
        .iter()
        .map(|tx| tx.tx_id().len())
        .max()
        .unwrap_or(0);
    let mut prefix_len = 1;
    while prefix_len < max_len {
        let mut prefixes = HashSet::new();
        if ordered
            .iter()
            .all(|tx| prefixes.insert(&tx.tx_id()[..prefix_len.min(tx.tx_id().len())]))
        {
            break;
        }
        prefix_len += 1;
    }

    ordered
        .iter()
        .map(|tx| tx.tx_id()[..prefix_len.min(tx.tx_id().len())].to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rec {
        id: &'static str,
        input: &'static str,
        output: &'static str,
    }

    impl Summarisable for Rec {
        fn tx_id(&self) -> &str {
            self.id
        }
        fn input(&self) -> &str {
            self.input
        }
        fn output(&self) -> &str {
            self.output
        }
    }

    fn chain() -> Vec<Rec> {
        vec![
            Rec { id: "aaa1", input: "1", output: "2" },
            Rec { id: "bbb2", input: "2", output: "3" },
            Rec { id: "ccc3", input: "3", output: "4" },
        ]
    }

    #[test]
    fn summary_of_chain_keeps_only_endpoints() {
        let (ins, outs) = summary(&chain());
        assert_eq!(ins, vec!["1".to_owned()]);
        assert_eq!(outs, vec!["4".to_owned()]);
    }

    #[test]
    fn summary_handles_multi_token_fields() {
        let txs = vec![
            Rec { id: "a", input: "x:y", output: "z" },
            Rec { id: "b", input: "z", output: "w:y" },
        ];
        let (ins, outs) = summary(&txs);
        assert_eq!(ins, vec!["x".to_owned()]);
        assert_eq!(outs, vec!["w".to_owned()]);
    }

    #[test]
    fn order_follows_the_chain() {
        let prefixes = order_prefixes(&chain());
        assert_eq!(prefixes, vec!["a", "b", "c"]);
    }

    #[test]
    fn prefixes_grow_until_unique() {
        let txs = vec![
            Rec { id: "ab11", input: "1", output: "2" },
            Rec { id: "ab22", input: "2", output: "3" },
        ];
        let prefixes = order_prefixes(&txs);
        assert_eq!(prefixes, vec!["ab1", "ab2"]);
    }

    #[test]
    fn order_of_empty_set_is_empty() {
        let txs: Vec<Rec> = Vec::new();
        assert!(order_prefixes(&txs).is_empty());
    }
}
