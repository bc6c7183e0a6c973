//! 数据访问层（Repositories）
//!
//! 每个实体一个仓储，每个方法对应一次存储操作（主键读取、扫描、索引查询、
//! 写入、条件更新、删除），不包含业务逻辑。存储错误原样向上传播。

pub mod grade_history;
pub mod lesson_plans;
pub mod questions;
pub mod schedules;
pub mod sessions;
pub mod students;
pub mod worksheets;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::infrastructure::{IndexSpec, Table, TableSpec};

pub use grade_history::GradeHistoryRepository;
pub use lesson_plans::LessonPlanRepository;
pub use questions::QuestionRepository;
pub use schedules::ScheduleRepository;
pub use sessions::SessionRepository;
pub use students::StudentRepository;
pub use worksheets::WorksheetRepository;

/// 按学生查询的二级索引名
pub const STUDENT_INDEX: &str = "StudentIndex";

const fn student_index(sort_key: Option<&'static str>) -> IndexSpec {
    IndexSpec {
        name: STUDENT_INDEX,
        partition_key: "student_id",
        sort_key,
    }
}

// ========== 表声明 ==========

pub const STUDENTS: TableSpec = TableSpec {
    entity: "students",
    key: "student_id",
    indexes: &[],
};

pub const QUESTIONS: TableSpec = TableSpec {
    entity: "questions",
    key: "question_id",
    indexes: &[],
};

pub const LESSON_PLANS: TableSpec = TableSpec {
    entity: "lesson-plans",
    key: "lesson_plan_id",
    indexes: &[student_index(Some("created_at"))],
};

pub const GRADE_HISTORY: TableSpec = TableSpec {
    entity: "grade-history",
    key: "grade_id",
    indexes: &[student_index(Some("graded_at"))],
};

pub const SESSIONS: TableSpec = TableSpec {
    entity: "sessions",
    key: "session_id",
    indexes: &[student_index(Some("date"))],
};

pub const SCHEDULES: TableSpec = TableSpec {
    entity: "session-schedules",
    key: "schedule_id",
    indexes: &[student_index(None)],
};

pub const WORKSHEETS: TableSpec = TableSpec {
    entity: "worksheets",
    key: "worksheet_id",
    indexes: &[student_index(Some("created_at"))],
};

// ========== 序列化辅助函数 ==========

pub(crate) fn to_item<T: Serialize>(table: &Table, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Serde {
        table: table.name.clone(),
        source,
    })
}

pub(crate) fn from_item<T: DeserializeOwned>(table: &Table, item: Value) -> Result<T, StoreError> {
    serde_json::from_value(item).map_err(|source| StoreError::Serde {
        table: table.name.clone(),
        source,
    })
}

pub(crate) fn from_items<T: DeserializeOwned>(table: &Table, items: Vec<Value>) -> Result<Vec<T>, StoreError> {
    items.into_iter().map(|item| from_item(table, item)).collect()
}
