use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

use crate::models::question::Question;

fn normalized_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Draws a randomized, duplicate-free, category-balanced snapshot from the bank.
///
/// Categories are visited round-robin in random order, so per-category counts
/// differ by at most one until a category runs dry. `count <= 0` takes every
/// distinct question.
pub fn select_questions<R: Rng + ?Sized>(bank: &[Question], count: i32, rng: &mut R) -> Vec<Question> {
    let mut seen_ids = HashSet::new();
    let mut seen_texts = HashSet::new();
    let mut by_category: BTreeMap<&str, Vec<&Question>> = BTreeMap::new();

    for q in bank {
        if !seen_ids.insert(q.id) || !seen_texts.insert(normalized_text(&q.text)) {
            continue;
        }
        by_category.entry(q.category.as_str()).or_default().push(q);
    }

    let distinct: usize = by_category.values().map(Vec::len).sum();
    let wanted = if count <= 0 {
        distinct
    } else {
        (count as usize).min(distinct)
    };

    let mut groups: Vec<Vec<&Question>> = by_category.into_values().collect();
    for group in groups.iter_mut() {
        group.shuffle(rng);
    }
    groups.shuffle(rng);

    let mut picked = Vec::with_capacity(wanted);
    let mut round = 0;
    while picked.len() < wanted {
        for group in &groups {
            if picked.len() == wanted {
                break;
            }
            if let Some(q) = group.get(round) {
                picked.push((*q).clone());
            }
        }
        round += 1;
    }

    picked.shuffle(rng);
    picked
}
