mod favorites;
mod practice_sessions;
mod profiles;
mod videos;
