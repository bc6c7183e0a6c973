pub mod document_service;
pub mod lesson_service;
pub mod llm_service;
pub mod question_parser;
pub mod session_service;
pub mod storage_service;
pub mod worksheet_service;

pub use document_service::{DocumentService, ExtractedAnswers, ExtractedDocument};
pub use lesson_service::{GeneratedLessonPlan, LessonPlanRequest, LessonService};
pub use llm_service::LlmService;
pub use question_parser::QuestionParser;
pub use session_service::{NewSchedule, NewSession, SessionListing, SessionService, UpcomingSession};
pub use storage_service::{PresignedUpload, StorageService, StoredDocument};
pub use worksheet_service::{CreatedWorksheet, GradeRequest, GradedWorksheet, NewWorksheet, WorksheetService};
