//! Merge policies for profile and progress documents.
//!
//! Every merge is commutative and idempotent: `merge(a, b) == merge(b, a)`
//! and `merge(m, m) == m`. Timestamp ties are broken by comparing values,
//! never by argument order.
//!
//! | Field group            | Policy                                       |
//! |------------------------|----------------------------------------------|
//! | achievements           | union by id, earliest unlock kept            |
//! | preferences, social    | latest `last_updated` wins                   |
//! | cultural competency    | highest score wins                           |
//! | vocabulary, grammar    | cumulative, scheduling fields take the max   |
//! | reading/quiz histories | union by session id                          |

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    Achievement, CompetencyScore, GrammarProgress, LearningProgress, PersonalizedPlan, Setting,
    SocialFeatures, UserProfile, VocabularyProgress,
};

/// Merge two copies of the same profile.
#[must_use]
pub fn merge_profiles(a: &UserProfile, b: &UserProfile) -> UserProfile {
    let newer = newer_of(a, b, a.last_updated, b.last_updated);

    UserProfile {
        user_id: max_str(&a.user_id, &b.user_id),
        display_name: newer.display_name.clone(),
        preferences: merge_maps(&a.preferences, &b.preferences, merge_setting),
        achievements: merge_achievements(&a.achievements, &b.achievements),
        cultural_competency: merge_maps(
            &a.cultural_competency,
            &b.cultural_competency,
            merge_competency,
        ),
        social: merge_social(&a.social, &b.social),
        platform_activity: merge_maps(&a.platform_activity, &b.platform_activity, |x, y| {
            *x.max(y)
        }),
        last_updated: a.last_updated.max(b.last_updated),
    }
}

/// Merge two copies of the same learning progress.
#[must_use]
pub fn merge_progress(a: &LearningProgress, b: &LearningProgress) -> LearningProgress {
    LearningProgress {
        user_id: max_str(&a.user_id, &b.user_id),
        vocabulary: merge_maps(&a.vocabulary, &b.vocabulary, merge_vocabulary),
        grammar: merge_maps(&a.grammar, &b.grammar, merge_grammar),
        reading_sessions: merge_maps(&a.reading_sessions, &b.reading_sessions, |x, y| {
            newer_of(x, y, x.completed_at, y.completed_at).clone()
        }),
        quiz_sessions: merge_maps(&a.quiz_sessions, &b.quiz_sessions, |x, y| {
            newer_of(x, y, x.completed_at, y.completed_at).clone()
        }),
        plan: match (&a.plan, &b.plan) {
            (Some(x), Some(y)) => Some(merge_plan(x, y)),
            (Some(p), None) | (None, Some(p)) => Some(p.clone()),
            (None, None) => None,
        },
        last_updated: a.last_updated.max(b.last_updated),
    }
}

/// Union of keys; values present on both sides are combined with `both`.
fn merge_maps<V: Clone>(
    a: &BTreeMap<String, V>,
    b: &BTreeMap<String, V>,
    both: impl Fn(&V, &V) -> V,
) -> BTreeMap<String, V> {
    let mut out = a.clone();
    for (key, theirs) in b {
        let merged = match a.get(key) {
            Some(ours) => both(ours, theirs),
            None => theirs.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

/// Pick the value with the later timestamp; on a tie the one whose
/// serialized form sorts last.
fn newer_of<'a, T: Serialize>(a: &'a T, b: &'a T, ts_a: i64, ts_b: i64) -> &'a T {
    match ts_a.cmp(&ts_b) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => {
            let ka = serde_json::to_string(a).unwrap_or_default();
            let kb = serde_json::to_string(b).unwrap_or_default();
            if ka >= kb {
                a
            } else {
                b
            }
        }
    }
}

fn max_str(a: &str, b: &str) -> String {
    a.max(b).to_string()
}

fn merge_setting(a: &Setting, b: &Setting) -> Setting {
    match a.last_updated.cmp(&b.last_updated) {
        Ordering::Greater => a.clone(),
        Ordering::Less => b.clone(),
        Ordering::Equal if a.value.tie_key() >= b.value.tie_key() => a.clone(),
        Ordering::Equal => b.clone(),
    }
}

fn merge_achievements(a: &[Achievement], b: &[Achievement]) -> Vec<Achievement> {
    let mut by_id: BTreeMap<&str, &Achievement> = BTreeMap::new();
    for achievement in a.iter().chain(b) {
        by_id
            .entry(achievement.id.as_str())
            .and_modify(|kept| {
                // First unlock wins
                let earlier = (achievement.unlocked_at, &achievement.title)
                    < (kept.unlocked_at, &kept.title);
                if earlier {
                    *kept = achievement;
                }
            })
            .or_insert(achievement);
    }
    by_id.into_values().cloned().collect()
}

fn merge_competency(a: &CompetencyScore, b: &CompetencyScore) -> CompetencyScore {
    let ord = a
        .score
        .total_cmp(&b.score)
        .then_with(|| a.last_updated.cmp(&b.last_updated));
    if ord == Ordering::Less {
        b.clone()
    } else {
        a.clone()
    }
}

fn merge_social(a: &SocialFeatures, b: &SocialFeatures) -> SocialFeatures {
    match a.last_updated.cmp(&b.last_updated) {
        Ordering::Greater => a.clone(),
        Ordering::Less => b.clone(),
        Ordering::Equal => SocialFeatures {
            friends_count: a.friends_count.max(b.friends_count),
            shared_achievements: a.shared_achievements.max(b.shared_achievements),
            study_streak_days: a.study_streak_days.max(b.study_streak_days),
            last_updated: a.last_updated,
        },
    }
}

fn merge_vocabulary(a: &VocabularyProgress, b: &VocabularyProgress) -> VocabularyProgress {
    VocabularyProgress {
        word: a.word.clone(),
        interval_days: a.interval_days.max(b.interval_days),
        ease_factor: a.ease_factor.max(b.ease_factor),
        repetitions: a.repetitions.max(b.repetitions),
        next_review: a.next_review.max(b.next_review),
        mastery_level: a.mastery_level.max(b.mastery_level),
        correct_count: a.correct_count.max(b.correct_count),
        incorrect_count: a.incorrect_count.max(b.incorrect_count),
        last_reviewed: a.last_reviewed.max(b.last_reviewed),
    }
}

fn merge_grammar(a: &GrammarProgress, b: &GrammarProgress) -> GrammarProgress {
    GrammarProgress {
        concept: a.concept.clone(),
        mastery_level: a.mastery_level.max(b.mastery_level),
        exercises_completed: a.exercises_completed.max(b.exercises_completed),
        correct_count: a.correct_count.max(b.correct_count),
        last_practiced: a.last_practiced.max(b.last_practiced),
    }
}

fn merge_plan(a: &PersonalizedPlan, b: &PersonalizedPlan) -> PersonalizedPlan {
    let base = newer_of(a, b, a.last_updated, b.last_updated);
    PersonalizedPlan {
        plan_id: base.plan_id.clone(),
        current_week: a.current_week.max(b.current_week),
        completed_goals: a.completed_goals.union(&b.completed_goals).cloned().collect(),
        focus_areas: base.focus_areas.clone(),
        last_updated: a.last_updated.max(b.last_updated),
    }
}
