//! Commit message language and length.

use std::sync::LazyLock;

use classpulse_reconcile::NormalizedRepo;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LATIN_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]+\b").expect("valid regex"));

/// Dominant script of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLanguage {
    Chinese,
    English,
    Mixed,
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Classify a message and return its length in CJK ideographs plus Latin words.
///
/// # Examples
///
/// ```
/// use classpulse_metrics::messages::{classify_message, MessageLanguage};
///
/// assert_eq!(classify_message("fix login bug"), (MessageLanguage::English, 3));
/// assert_eq!(classify_message("修复登录"), (MessageLanguage::Chinese, 4));
/// assert_eq!(classify_message(""), (MessageLanguage::Mixed, 0));
/// ```
pub fn classify_message(message: &str) -> (MessageLanguage, usize) {
    let cjk = message.chars().filter(|c| is_cjk(*c)).count();
    let latin = LATIN_WORD_RE.find_iter(message).count();
    let total = cjk + latin;
    if total == 0 {
        return (MessageLanguage::Mixed, 0);
    }
    // both >= 40% of total, in integers
    let lang = if cjk * 5 >= total * 2 && latin * 5 >= total * 2 {
        MessageLanguage::Mixed
    } else if cjk > latin {
        MessageLanguage::Chinese
    } else if latin > cjk {
        MessageLanguage::English
    } else {
        MessageLanguage::Mixed
    };
    (lang, total)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCounter {
    pub chinese: u64,
    pub english: u64,
    pub mixed: u64,
}

/// One histogram bin, labelled `start–end` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBin {
    pub length_range: String,
    pub count: u64,
}

/// Fixed-width histogram spanning the observed min..max.
///
/// # Examples
///
/// ```
/// use classpulse_metrics::messages::length_distribution;
///
/// let bins = length_distribution(&[3, 4, 9], 5);
/// assert_eq!(bins.len(), 2);
/// assert_eq!(bins[0].length_range, "3–7");
/// assert_eq!(bins[0].count, 2);
/// ```
pub fn length_distribution(lengths: &[usize], bin_width: usize) -> Vec<LengthBin> {
    let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) else {
        return Vec::new();
    };
    let width = bin_width.max(1);
    let num_bins = (max - min + 1).div_ceil(width);
    let mut bins = vec![0u64; num_bins];
    for len in lengths {
        bins[((len - min) / width).min(num_bins - 1)] += 1;
    }
    bins.into_iter()
        .enumerate()
        .map(|(i, count)| {
            let start = min + i * width;
            LengthBin {
                length_range: format!("{start}–{}", start + width - 1),
                count,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessageInfo {
    pub lang_counter: LanguageCounter,
    pub length_distribution: Vec<LengthBin>,
}

/// Classify every retained commit message; lengths above `length_limit`
/// are left out of the histogram.
pub fn commit_message_info(
    repos: &[&NormalizedRepo],
    length_limit: usize,
    bin_width: usize,
) -> CommitMessageInfo {
    let mut info = CommitMessageInfo::default();
    let mut lengths = Vec::new();
    for commit in repos.iter().flat_map(|r| &r.commits) {
        let (lang, len) = classify_message(&commit.message);
        match lang {
            MessageLanguage::Chinese => info.lang_counter.chinese += 1,
            MessageLanguage::English => info.lang_counter.english += 1,
            MessageLanguage::Mixed => info.lang_counter.mixed += 1,
        }
        if len <= length_limit {
            lengths.push(len);
        }
    }
    info.length_distribution = length_distribution(&lengths, bin_width);
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn mixed_when_both_scripts_are_substantial() {
        // 2 CJK + 2 words
        assert_eq!(classify_message("修复 login bug"), (MessageLanguage::Mixed, 4));
    }

    #[test]
    fn majority_script_wins_below_threshold() {
        // 6 CJK + 1 word
        assert_eq!(classify_message("修复登录 bug 页面"), (MessageLanguage::Chinese, 7));
        assert_eq!(
            classify_message("refactor the user service layer 改"),
            (MessageLanguage::English, 6)
        );
    }

    #[test]
    fn punctuation_and_digits_are_not_counted() {
        assert_eq!(classify_message("123 !!! ---"), (MessageLanguage::Mixed, 0));
        assert_eq!(classify_message("v2: update"), (MessageLanguage::English, 1));
    }

    #[test]
    fn single_length_gets_one_bin() {
        let bins = length_distribution(&[0, 0, 0], 5);
        assert_eq!(
            bins,
            vec![LengthBin {
                length_range: "0–4".into(),
                count: 3
            }]
        );
    }

    #[test]
    fn empty_lengths_give_no_bins() {
        assert!(length_distribution(&[], 5).is_empty());
    }

    proptest! {
        #[test]
        fn bins_account_for_every_length(lengths in proptest::collection::vec(0usize..=100, 0..80)) {
            let bins = length_distribution(&lengths, 5);
            prop_assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), lengths.len() as u64);
        }
    }
}
