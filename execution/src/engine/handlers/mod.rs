mod tournaments;
mod users;
