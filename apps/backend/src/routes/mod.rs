pub mod auth;
pub mod changes;
pub mod dictionaries;
pub mod private_words;
pub mod users;
pub mod words;
