//! Heuristic conflict counters.
//!
//! A conflict is informational: the merge policy always picks a winner.
//! Counts are reported in the sync result and exported as metrics.

use crate::model::{LearningProgress, UserProfile};

/// Words per counted conflict when vocabulary sizes diverge.
const VOCABULARY_GAP_PER_CONFLICT: usize = 10;

/// One conflict per preference set on both sides to different values and
/// one per competency theme scored differently on both sides.
#[must_use]
pub fn count_profile_conflicts(a: &UserProfile, b: &UserProfile) -> u32 {
    let preferences = a
        .preferences
        .iter()
        .filter(|(name, ours)| {
            b.preferences
                .get(*name)
                .is_some_and(|theirs| theirs.value != ours.value)
        })
        .count();

    let competency = a
        .cultural_competency
        .iter()
        .filter(|(theme, ours)| {
            b.cultural_competency
                .get(*theme)
                .is_some_and(|theirs| (theirs.score - ours.score).abs() > f64::EPSILON)
        })
        .count();

    (preferences + competency) as u32
}

/// One conflict per ten-word gap in vocabulary size plus one per word whose
/// scheduling state differs between the two sides.
#[must_use]
pub fn count_progress_conflicts(a: &LearningProgress, b: &LearningProgress) -> u32 {
    let gap = a.vocabulary.len().abs_diff(b.vocabulary.len()) / VOCABULARY_GAP_PER_CONFLICT;

    let diverged = a
        .vocabulary
        .iter()
        .filter(|(word, ours)| {
            b.vocabulary
                .get(*word)
                .is_some_and(|theirs| ours.schedule_differs(theirs))
        })
        .count();

    (gap + diverged) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompetencyScore, SettingValue, VocabularyProgress};

    #[test]
    fn test_identical_profiles_have_no_conflicts() {
        let mut p = UserProfile::new("u1");
        p.set_preference("theme", SettingValue::Text("dark".into()), 1);
        assert_eq!(count_profile_conflicts(&p, &p.clone()), 0);
    }

    #[test]
    fn test_profile_conflicts() {
        let mut a = UserProfile::new("u1");
        a.set_preference("theme", SettingValue::Text("dark".into()), 1);
        a.set_preference("sound", SettingValue::Flag(true), 1);
        a.set_preference("only_here", SettingValue::Flag(true), 1);
        a.cultural_competency.insert(
            "music".into(),
            CompetencyScore {
                score: 0.5,
                last_updated: 1,
            },
        );
        let mut b = UserProfile::new("u1");
        b.set_preference("theme", SettingValue::Text("light".into()), 2);
        b.set_preference("sound", SettingValue::Flag(true), 2);
        b.cultural_competency.insert(
            "music".into(),
            CompetencyScore {
                score: 0.7,
                last_updated: 1,
            },
        );

        assert_eq!(count_profile_conflicts(&a, &b), 2);
    }

    #[test]
    fn test_vocabulary_gap_counts_per_ten_words() {
        let mut a = LearningProgress::new("u1");
        for i in 0..25 {
            a.upsert_word(VocabularyProgress::new(format!("w{}", i)));
        }
        let mut b = LearningProgress::new("u1");
        b.upsert_word(VocabularyProgress::new("w0"));

        // gap 24 -> 2, w0 identical
        assert_eq!(count_progress_conflicts(&a, &b), 2);

        let mut changed = VocabularyProgress::new("w0");
        changed.repetitions = 3;
        b.upsert_word(changed);
        assert_eq!(count_progress_conflicts(&a, &b), 3);
    }
}
