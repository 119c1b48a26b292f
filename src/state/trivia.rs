//! Trivia interlude question selection and sticky station encounters.

use rand::{Rng, seq::IndexedRandom};

use crate::state::{
    catalog::{Catalog, Reward, TriviaQuestion},
    session::{TeamProgress, TriviaCursor},
};

/// Move the cursor to a new question, preferring ones not asked yet.
///
/// Once every question was used the used list starts over.
pub fn pick_question<'a, R: Rng + ?Sized>(
    catalog: &'a Catalog,
    cursor: &mut TriviaCursor,
    rng: &mut R,
) -> Option<&'a TriviaQuestion> {
    if cursor.used_question_ids.len() >= catalog.trivia.len() {
        cursor.used_question_ids.clear();
    }

    let unused: Vec<&TriviaQuestion> = catalog
        .trivia
        .iter()
        .filter(|question| !cursor.used_question_ids.contains(&question.id))
        .collect();
    let question = match unused.choose(rng) {
        Some(question) => *question,
        None => catalog.trivia.choose(rng)?,
    };

    cursor.current_question_id = Some(question.id.clone());
    if !cursor.used_question_ids.contains(&question.id) {
        cursor.used_question_ids.push(question.id.clone());
    }
    Some(question)
}

/// Whether `answer` matches the question's answer exactly.
pub fn is_correct(question: &TriviaQuestion, answer: &str) -> bool {
    question.answer == answer
}

/// Reward shown to `team` at `station_id`.
///
/// The first view rolls one, preferring rewards the team has not met at other
/// stations, and remembers it so later views show the same one.
pub fn encounter_for<'a, R: Rng + ?Sized>(
    team: &mut TeamProgress,
    station_id: &str,
    rewards: &'a [Reward],
    rng: &mut R,
) -> Option<&'a Reward> {
    if let Some(chosen) = team
        .sticky_choices
        .get(station_id)
        .and_then(|id| rewards.iter().find(|reward| &reward.id == id))
    {
        return Some(chosen);
    }

    let unseen: Vec<&Reward> = rewards
        .iter()
        .filter(|reward| !team.sticky_choices.values().any(|seen| seen == &reward.id))
        .collect();
    let chosen = match unseen.choose(rng) {
        Some(reward) => *reward,
        None => rewards.choose(rng)?,
    };
    team.sticky_choices
        .insert(station_id.to_owned(), chosen.id.clone());
    Some(chosen)
}
