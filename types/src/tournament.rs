use serde::{Deserialize, Serialize};

use crate::{validate_name, Error, Points, TournamentId, UserId};

/// Tournament phases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    #[default]
    Active,
    Finished,
}

/// A user admitted to a tournament. The name is captured at join time so the
/// roster of a finished tournament survives later account deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub name: String,
}

/// Tournament state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub deposit: Points,
    pub prize: Points,
    pub status: TournamentStatus,
    pub winner_id: Option<UserId>,
    /// Join order, used for display.
    participants: Vec<Participant>,
    /// Sorted ids mirroring `participants`, used for membership checks.
    members: Vec<UserId>,
}

impl Tournament {
    /// Validate creation inputs.
    pub fn validate(name: &str, deposit: Points) -> Result<(), Error> {
        validate_name(name)?;
        if deposit <= 0 {
            return Err(Error::InvalidRegistration("deposit must be > 0"));
        }
        Ok(())
    }

    pub fn new(id: TournamentId, name: String, deposit: Points) -> Self {
        Self {
            id,
            name,
            deposit,
            prize: 0,
            status: TournamentStatus::Active,
            winner_id: None,
            participants: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Rebuild a record loaded from storage. Duplicate participants are dropped.
    pub fn restore(
        id: TournamentId,
        name: String,
        deposit: Points,
        prize: Points,
        status: TournamentStatus,
        winner_id: Option<UserId>,
        participants: Vec<Participant>,
    ) -> Self {
        let mut tournament = Self {
            id,
            name,
            deposit,
            prize,
            status,
            winner_id,
            participants: Vec::with_capacity(participants.len()),
            members: Vec::with_capacity(participants.len()),
        };
        for participant in participants {
            if let Err(pos) = tournament.members.binary_search(&participant.user_id) {
                tournament.members.insert(pos, participant.user_id);
                tournament.participants.push(participant);
            }
        }
        tournament
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn is_active(&self) -> bool {
        self.status == TournamentStatus::Active
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.members.binary_search(&user_id).is_ok()
    }

    /// Check that `user_id` could be admitted, returning the prize after their deposit.
    pub fn check_admit(&self, user_id: UserId) -> Result<Points, Error> {
        if !self.is_active() {
            return Err(Error::TournamentFinished(self.id));
        }
        if self.contains(user_id) {
            return Err(Error::AlreadyRegistered {
                tournament: self.id,
                user: user_id,
            });
        }
        self.prize
            .checked_add(self.deposit)
            .ok_or(Error::PrizeOverflow(self.id))
    }

    /// Record a new participant and add their deposit to the pool.
    ///
    /// Checks happen before any field changes, so an error leaves the record as it was.
    pub fn admit(&mut self, participant: Participant) -> Result<Points, Error> {
        let prize = self.check_admit(participant.user_id)?;
        let pos = match self.members.binary_search(&participant.user_id) {
            Ok(pos) | Err(pos) => pos,
        };
        self.members.insert(pos, participant.user_id);
        self.participants.push(participant);
        self.prize = prize;
        Ok(prize)
    }

    /// Check that the tournament could be finished with `winner`, returning the prize.
    pub fn check_settle(&self, winner: UserId) -> Result<Points, Error> {
        if !self.is_active() {
            return Err(Error::AlreadyFinished(self.id));
        }
        if self.participants.is_empty() {
            return Err(Error::NoParticipants(self.id));
        }
        if !self.contains(winner) {
            return Err(Error::UserNotFound(winner));
        }
        Ok(self.prize)
    }

    /// Mark the tournament finished with `winner`, returning the prize to pay out.
    pub fn settle(&mut self, winner: UserId) -> Result<Points, Error> {
        let prize = self.check_settle(winner)?;
        self.status = TournamentStatus::Finished;
        self.winner_id = Some(winner);
        Ok(prize)
    }

    /// Render the status-dependent wire representation.
    pub fn view(&self) -> TournamentView {
        match (self.status, self.winner_id) {
            (TournamentStatus::Finished, Some(winner)) => {
                TournamentView::Finished(FinishedTournament {
                    id: self.id,
                    name: self.name.clone(),
                    winner,
                    prize: self.prize,
                    users: self
                        .participants
                        .iter()
                        .map(|p| FinishedEntry {
                            user_id: p.user_id,
                            name: p.name.clone(),
                            winner: p.user_id == winner,
                        })
                        .collect(),
                    status: TournamentStatus::Finished,
                })
            }
            _ => TournamentView::Active(ActiveTournament {
                id: self.id,
                name: self.name.clone(),
                deposit: self.deposit,
                prize: self.prize,
                status: self.status,
                users: self
                    .participants
                    .iter()
                    .map(|p| ActiveEntry {
                        user_id: p.user_id,
                        name: p.name.clone(),
                    })
                    .collect(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEntry {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedEntry {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub name: String,
    pub winner: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTournament {
    pub id: TournamentId,
    pub name: String,
    pub deposit: Points,
    pub prize: Points,
    pub status: TournamentStatus,
    pub users: Vec<ActiveEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedTournament {
    pub id: TournamentId,
    pub name: String,
    pub winner: UserId,
    pub prize: Points,
    pub users: Vec<FinishedEntry>,
    pub status: TournamentStatus,
}

/// Tournament as returned to callers: winner info only once finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TournamentView {
    Active(ActiveTournament),
    Finished(FinishedTournament),
}

impl TournamentView {
    pub fn id(&self) -> TournamentId {
        match self {
            TournamentView::Active(t) => t.id,
            TournamentView::Finished(t) => t.id,
        }
    }

    pub fn prize(&self) -> Points {
        match self {
            TournamentView::Active(t) => t.prize,
            TournamentView::Finished(t) => t.prize,
        }
    }

    pub fn status(&self) -> TournamentStatus {
        match self {
            TournamentView::Active(t) => t.status,
            TournamentView::Finished(t) => t.status,
        }
    }
}
