//! Per-user session state and the pure transitions between screens.
//!
//! A session moves `Collecting -> Resolving -> Presenting`. `Collecting` has
//! one sub-step per question (or bracket match). Every user action goes
//! through [`reduce`], which takes the old state and returns the new one.

use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Question};
use crate::verdict::Verdict;

/// Which screen a session is on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Answering choice number `step` (zero-based).
    Collecting {
        /// Zero-based index of the current choice.
        step: usize,
    },
    /// All choices made, waiting for a photo.
    Resolving,
    /// Verdict and poster are ready.
    Presenting,
}

/// Tournament state: the entrants of the current round and who has advanced.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    /// Entrants of the current round; match `i` is `round[2i]` vs `round[2i + 1]`.
    pub round: Vec<String>,
    /// Winners so far in the current round.
    pub winners: Vec<String>,
    /// One-based round number.
    pub round_number: usize,
}

impl Bracket {
    fn current_pair(&self) -> Option<(&str, &str)> {
        let index = self.winners.len() * 2;
        let left = self.round.get(index)?;
        let right = self.round.get(index + 1)?;
        Some((left.as_str(), right.as_str()))
    }

    fn advance(&mut self, winner: String) {
        self.winners.push(winner);
        if self.winners.len() * 2 >= self.round.len() && self.winners.len() > 1 {
            self.round = std::mem::take(&mut self.winners);
            self.round_number += 1;
        }
    }
}

/// Everything remembered for one user between requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CastingSession {
    /// Number of choices made so far.
    pub step: usize,
    /// Tags in the order they were chosen.
    pub answers: Vec<String>,
    /// Tournament state, only in bracket mode.
    #[serde(default)]
    pub bracket: Option<Bracket>,
    /// Resolved verdict.
    pub verdict: Option<Verdict>,
    /// Transient URL of the generated poster.
    pub poster_url: Option<String>,
}

impl CastingSession {
    /// Derives the current screen.
    pub fn stage(&self, ballot: &Ballot) -> Stage {
        if self.verdict.is_some() && self.poster_url.is_some() {
            Stage::Presenting
        } else if self.step >= ballot.rounds() {
            Stage::Resolving
        } else {
            Stage::Collecting { step: self.step }
        }
    }
}

/// A choice shown on a collecting screen.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Choice {
    /// Button text.
    pub label: String,
    /// Tag recorded when picked.
    pub tag: String,
}

/// The prompt and options of the current step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Matchup {
    /// Heading for the screen.
    pub prompt: String,
    /// Exactly two choices.
    pub options: [Choice; 2],
}

/// How answers are collected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Ballot {
    /// Fixed questions, asked in order.
    Questions(Vec<Question>),
    /// Single-elimination bracket over `size` archetypes.
    Bracket {
        /// Number of entrants, a power of two.
        size: usize,
    },
}

/// Errors from [`reduce`] and ballot construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FlowError {
    /// The option index wasn't 0 or 1.
    InvalidOption(usize),
    /// The action doesn't apply to the current stage.
    WrongStage(Stage),
    /// Bracket mode session was never seeded.
    Unseeded,
    /// Bracket size isn't a power of two within the roster.
    InvalidBracketSize(usize),
}

impl std::fmt::Display for FlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOption(option) => write!(f, "Option {option} is not one of the two choices"),
            Self::WrongStage(stage) => write!(f, "Action not allowed while {stage:?}"),
            Self::Unseeded => write!(f, "Bracket has not been seeded"),
            Self::InvalidBracketSize(size) => write!(
                f,
                "Bracket size {size} must be a power of two between 2 and the roster size"
            ),
        }
    }
}

impl std::error::Error for FlowError {}

impl Ballot {
    /// Question mode over the catalog's questions.
    pub fn questions(catalog: &Catalog) -> Self {
        Self::Questions(catalog.questions.clone())
    }

    /// Bracket mode; `size` must be a power of two no bigger than the roster.
    pub fn bracket(catalog: &Catalog, size: usize) -> Result<Self, FlowError> {
        if size < 2 || !size.is_power_of_two() || size > catalog.archetypes.len() {
            return Err(FlowError::InvalidBracketSize(size));
        }
        Ok(Self::Bracket { size })
    }

    /// How many choices until collection is complete.
    pub fn rounds(&self) -> usize {
        match self {
            Self::Questions(questions) => questions.len(),
            Self::Bracket { size } => size.saturating_sub(1),
        }
    }

    /// Fills in the bracket for a fresh session. Questions mode is untouched.
    pub fn seed<R: Rng + ?Sized>(
        &self,
        mut session: CastingSession,
        catalog: &Catalog,
        rng: &mut R,
    ) -> CastingSession {
        let Self::Bracket { size } = self else {
            return session;
        };
        if session.bracket.is_some() || session.step > 0 {
            return session;
        }
        let mut roster: Vec<String> = catalog
            .archetypes
            .iter()
            .map(|archetype| archetype.label.clone())
            .collect();
        // Fisher-Yates
        for index in (1..roster.len()).rev() {
            let other = rng.random_range(0..=index);
            roster.swap(index, other);
        }
        roster.truncate(*size);
        session.bracket = Some(Bracket {
            round: roster,
            winners: Vec::new(),
            round_number: 1,
        });
        session
    }

    /// The choice for the current step, if still collecting.
    pub fn matchup(&self, session: &CastingSession) -> Option<Matchup> {
        if session.step >= self.rounds() {
            return None;
        }
        match self {
            Self::Questions(questions) => {
                let question = questions.get(session.step)?;
                let [left, right] = &question.options;
                Some(Matchup {
                    prompt: question.prompt.clone(),
                    options: [
                        Choice {
                            label: left.label.clone(),
                            tag: left.tag.clone(),
                        },
                        Choice {
                            label: right.label.clone(),
                            tag: right.tag.clone(),
                        },
                    ],
                })
            }
            Self::Bracket { .. } => {
                let bracket = session.bracket.as_ref()?;
                let (left, right) = bracket.current_pair()?;
                let prompt = if bracket.round.len() == 2 {
                    "Final round: who takes the lead role?".to_string()
                } else {
                    format!("Round {}: who gets the part?", bracket.round_number)
                };
                Some(Matchup {
                    prompt,
                    options: [
                        Choice {
                            label: left.to_string(),
                            tag: left.to_string(),
                        },
                        Choice {
                            label: right.to_string(),
                            tag: right.to_string(),
                        },
                    ],
                })
            }
        }
    }
}

/// A user action.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Pick option 0 or 1 of the current matchup.
    Choose(usize),
    /// The verdict and poster came back.
    Cast {
        /// The resolved verdict.
        verdict: Verdict,
        /// The poster URL.
        poster_url: String,
    },
    /// Throw everything away.
    Restart,
}

/// Applies `action` to `session`.
pub fn reduce(
    ballot: &Ballot,
    session: CastingSession,
    action: Action,
) -> Result<CastingSession, FlowError> {
    let stage = session.stage(ballot);
    match action {
        Action::Restart => Ok(CastingSession::default()),
        Action::Choose(option) => {
            if !matches!(stage, Stage::Collecting { .. }) {
                return Err(FlowError::WrongStage(stage));
            }
            if option > 1 {
                return Err(FlowError::InvalidOption(option));
            }
            let matchup = ballot.matchup(&session).ok_or(FlowError::Unseeded)?;
            let [left, right] = matchup.options;
            let chosen = if option == 0 { left } else { right };

            let mut next = session;
            if let Some(bracket) = next.bracket.as_mut() {
                bracket.advance(chosen.tag.clone());
            }
            next.answers.push(chosen.tag);
            next.step += 1;
            Ok(next)
        }
        Action::Cast {
            verdict,
            poster_url,
        } => {
            if stage != Stage::Resolving {
                return Err(FlowError::WrongStage(stage));
            }
            let mut next = session;
            next.verdict = Some(verdict);
            next.poster_url = Some(poster_url);
            Ok(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::bundled().expect("bundled catalog")
    }

    fn verdict() -> Verdict {
        Verdict {
            label: "Noir Mastermind".to_string(),
            reason: "test".to_string(),
        }
    }

    #[test]
    fn answers_follow_choice_order() {
        let catalog = catalog();
        let ballot = Ballot::questions(&catalog);
        let mut session = CastingSession::default();
        for option in [0, 0, 0] {
            session = reduce(&ballot, session, Action::Choose(option)).expect("choose");
        }
        assert_eq!(session.answers, vec!["Explorer", "Mastermind", "Cyberpunk"]);
        assert_eq!(session.answers.len(), catalog.questions.len());
        assert_eq!(session.stage(&ballot), Stage::Resolving);

        let mut session = CastingSession::default();
        for option in [1, 0, 1] {
            session = reduce(&ballot, session, Action::Choose(option)).expect("choose");
        }
        assert_eq!(session.answers, vec!["Vigilante", "Mastermind", "Classic"]);
    }

    #[test]
    fn rejects_bad_option_and_extra_choices() {
        let ballot = Ballot::questions(&catalog());
        assert_eq!(
            reduce(&ballot, CastingSession::default(), Action::Choose(2)),
            Err(FlowError::InvalidOption(2))
        );

        let mut session = CastingSession::default();
        for _ in 0..3 {
            session = reduce(&ballot, session, Action::Choose(1)).expect("choose");
        }
        assert_eq!(
            reduce(&ballot, session, Action::Choose(0)),
            Err(FlowError::WrongStage(Stage::Resolving))
        );
    }

    #[test]
    fn cast_only_once_collection_is_done() {
        let ballot = Ballot::questions(&catalog());
        let early = reduce(
            &ballot,
            CastingSession::default(),
            Action::Cast {
                verdict: verdict(),
                poster_url: "http://x/img.png".to_string(),
            },
        );
        assert_eq!(
            early,
            Err(FlowError::WrongStage(Stage::Collecting { step: 0 }))
        );
    }

    #[test]
    fn restart_from_presenting_clears_everything() {
        let ballot = Ballot::questions(&catalog());
        let mut session = CastingSession::default();
        for _ in 0..3 {
            session = reduce(&ballot, session, Action::Choose(0)).expect("choose");
        }
        session = reduce(
            &ballot,
            session,
            Action::Cast {
                verdict: verdict(),
                poster_url: "http://x/img.png".to_string(),
            },
        )
        .expect("cast");
        assert_eq!(session.stage(&ballot), Stage::Presenting);

        let session = reduce(&ballot, session, Action::Restart).expect("restart");
        assert_eq!(session.step, 0);
        assert!(session.answers.is_empty());
        assert!(session.verdict.is_none());
        assert!(session.poster_url.is_none());
        assert_eq!(session, CastingSession::default());
        assert_eq!(session.stage(&ballot), Stage::Collecting { step: 0 });
    }

    #[test]
    fn bracket_size_is_validated() {
        let catalog = catalog();
        assert!(Ballot::bracket(&catalog, 8).is_ok());
        assert_eq!(
            Ballot::bracket(&catalog, 6),
            Err(FlowError::InvalidBracketSize(6))
        );
        assert_eq!(
            Ballot::bracket(&catalog, 16),
            Err(FlowError::InvalidBracketSize(16))
        );
        assert_eq!(
            Ballot::bracket(&catalog, 1),
            Err(FlowError::InvalidBracketSize(1))
        );
    }

    #[test]
    fn bracket_runs_to_a_single_winner() {
        let catalog = catalog();
        let ballot = Ballot::bracket(&catalog, 8).expect("bracket");
        assert_eq!(ballot.rounds(), 7);

        let mut session = ballot.seed(CastingSession::default(), &catalog, &mut rand::rng());
        let entrants = session.bracket.as_ref().expect("seeded").round.clone();
        assert_eq!(entrants.len(), 8);
        assert!(entrants.iter().all(|label| catalog.archetype(label).is_some()));

        // Seeding again keeps the same draw.
        session = ballot.seed(session, &catalog, &mut rand::rng());
        assert_eq!(session.bracket.as_ref().expect("seeded").round, entrants);

        let first = ballot.matchup(&session).expect("matchup");
        assert_eq!(first.prompt, "Round 1: who gets the part?");
        assert_eq!(first.options[0].label, entrants[0]);
        assert_eq!(first.options[1].label, entrants[1]);

        // Always pick the left entrant.
        for _ in 0..7 {
            session = reduce(&ballot, session, Action::Choose(0)).expect("choose");
        }
        assert_eq!(session.stage(&ballot), Stage::Resolving);
        assert_eq!(session.answers.len(), 7);
        assert_eq!(
            session.answers[..4],
            [
                entrants[0].clone(),
                entrants[2].clone(),
                entrants[4].clone(),
                entrants[6].clone()
            ]
        );
        assert_eq!(session.answers.last(), Some(&entrants[0]));
        assert!(ballot.matchup(&session).is_none());
    }

    #[test]
    fn unseeded_bracket_refuses_choices() {
        let catalog = catalog();
        let ballot = Ballot::bracket(&catalog, 4).expect("bracket");
        assert_eq!(
            reduce(&ballot, CastingSession::default(), Action::Choose(0)),
            Err(FlowError::Unseeded)
        );
    }
}
