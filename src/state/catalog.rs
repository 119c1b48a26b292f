//! Static game content: teams, stations, trivia, rewards and the final clue.
//!
//! Loaded once at startup and shared read-only by every component.

use serde::{Deserialize, Serialize};

/// Immutable identity of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: String,
    pub name: String,
}

/// A physical puzzle checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    /// Clue read by the team when it is sent to the station.
    pub riddle: String,
    /// Unlock code found at the station.
    pub code: String,
    #[serde(default)]
    pub how_to_play: Vec<String>,
    #[serde(default)]
    pub find_code_poem: Option<String>,
    #[serde(default)]
    pub find_code_hint: Option<String>,
}

/// Read-aloud fact attached to a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFact {
    pub question: String,
    pub answer: String,
}

/// Encounter shown at a station, picked from the reward pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub facts: Vec<RewardFact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriviaQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalClue {
    pub title: String,
    pub riddle: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Everything the game reads from static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub title: String,
    pub teams: Vec<TeamInfo>,
    pub stations: Vec<Station>,
    #[serde(default)]
    pub trivia: Vec<TriviaQuestion>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    pub final_clue: FinalClue,
}

impl Catalog {
    /// Number of completions a team needs to be done.
    pub fn max_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|station| station.id == id)
    }

    pub fn team(&self, id: &str) -> Option<&TeamInfo> {
        self.teams.iter().find(|team| team.id == id)
    }

    pub fn is_station(&self, id: &str) -> bool {
        self.station(id).is_some()
    }

    pub fn is_team(&self, id: &str) -> bool {
        self.team(id).is_some()
    }

    /// Station ids in catalog order.
    pub fn station_ids(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(|station| station.id.as_str())
    }

    pub fn team_ids(&self) -> impl Iterator<Item = &str> {
        self.teams.iter().map(|team| team.id.as_str())
    }

    pub fn question(&self, id: &str) -> Option<&TriviaQuestion> {
        self.trivia.iter().find(|question| question.id == id)
    }

    pub fn reward(&self, id: &str) -> Option<&Reward> {
        self.rewards.iter().find(|reward| reward.id == id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Four teams, stations A to E, a small trivia bank and reward pool.
    pub(crate) fn catalog() -> Catalog {
        let teams = [("red", "Red"), ("blue", "Blue"), ("green", "Green"), ("yellow", "Yellow")]
            .into_iter()
            .map(|(id, name)| TeamInfo {
                id: id.into(),
                name: name.into(),
            })
            .collect();
        let stations = ["A", "B", "C", "D", "E"]
            .into_iter()
            .map(|id| Station {
                id: id.into(),
                name: format!("Station {id}"),
                riddle: format!("Find the marker for {id}"),
                code: format!("CODE{id}"),
                how_to_play: vec!["Play".into()],
                find_code_poem: None,
                find_code_hint: None,
            })
            .collect();
        let trivia = ["q1", "q2", "q3"]
            .into_iter()
            .map(|id| TriviaQuestion {
                id: id.into(),
                prompt: format!("Question {id}?"),
                options: vec!["yes".into(), "no".into()],
                answer: "yes".into(),
                image: None,
            })
            .collect();
        let rewards = ["r1", "r2", "r3"]
            .into_iter()
            .map(|id| Reward {
                id: id.into(),
                name: format!("Reward {id}"),
                image: None,
                facts: Vec::new(),
            })
            .collect();
        Catalog {
            title: "Station Quest".into(),
            teams,
            stations,
            trivia,
            rewards,
            final_clue: FinalClue {
                title: "Final clue".into(),
                riddle: "Look under the big tree".into(),
                hint: None,
                image: None,
            },
        }
    }
}
