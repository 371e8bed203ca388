pub mod notification_service;
pub mod question_selection;
pub mod scoring_service;
pub mod session_service;
pub mod window;
