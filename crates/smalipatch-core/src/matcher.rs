use crate::types::ContextLine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSearch {
    /// Body index where the anchor run starts.
    Unique(usize),
    Ambiguous(Vec<usize>),
    /// Closest attempt: the context entry that failed and the body index it
    /// was compared against.
    Missing {
        context_index: usize,
        body_index: usize,
    },
}

/// Looks for the Keep/Remove lines of `context`, in order and contiguous,
/// inside `body`. Comparison is exact.
pub fn find_context(body: &[String], context: &[ContextLine]) -> ContextSearch {
    let anchors: Vec<(usize, &str)> = context
        .iter()
        .enumerate()
        .filter(|(_, line)| line.is_anchor())
        .map(|(i, line)| (i, line.text()))
        .collect();

    if anchors.is_empty() {
        return ContextSearch::Missing {
            context_index: 0,
            body_index: 0,
        };
    }

    let body_lines: Vec<&str> = body.iter().map(String::as_str).collect();
    let anchor_lines: Vec<&str> = anchors.iter().map(|(_, text)| *text).collect();

    match find_sublist(&body_lines, &anchor_lines).as_slice() {
        [] => {
            let (start, matched) = best_partial(&body_lines, &anchor_lines);
            ContextSearch::Missing {
                context_index: anchors[matched].0,
                body_index: start + matched,
            }
        }
        [one] => ContextSearch::Unique(*one),
        many => ContextSearch::Ambiguous(many.to_vec()),
    }
}

fn best_partial(full_list: &[&str], sub_list: &[&str]) -> (usize, usize) {
    let mut best = (0, 0);
    for start in 0..full_list.len() {
        let matched = full_list[start..]
            .iter()
            .zip(sub_list)
            .take_while(|(a, b)| a == b)
            .count();
        if matched > best.1 {
            best = (start, matched);
        }
    }
    best
}

pub fn find_sublist<T: PartialEq>(full_list: &[T], sub_list: &[T]) -> Vec<usize> {
    let mut matches = Vec::new();
    let n = full_list.len();
    let m = sub_list.len();

    if m == 0 || m > n {
        return matches;
    }

    for i in 0..=n - m {
        if &full_list[i..i + m] == sub_list {
            matches.push(i);
        }
    }
    matches
}
