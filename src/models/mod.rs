//! 领域模型
//!
//! 与存储表一一对应的实体，以及 AI 能力的结构化输入输出。

pub mod lesson_plan;
pub mod question;
pub mod session;
pub mod student;
pub mod worksheet;

pub use lesson_plan::{LessonPlan, LessonStructure, StudentContext};
pub use question::{Classification, Difficulty, Explanation, ParsedQuestion, Question};
pub use session::{auto_session_id, manual_session_id, RecurringSchedule, Session, SessionOrigin};
pub use student::{GradeRecord, GradeTrend, Student};
pub use worksheet::{
    CandidateQuestion, GradingResult, QuestionResult, SectionPlan, SelectionCriteria, Worksheet,
};
