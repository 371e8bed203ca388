pub mod answer;
pub mod candidate;
pub mod question;
pub mod result;
pub mod session;
pub mod test;
pub mod violation;
