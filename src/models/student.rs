use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 正确率低于该值的知识点视为薄弱项
pub const WEAK_ACCURACY_THRESHOLD: f64 = 0.7;

/// 学生档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    #[serde(default)]
    pub grade: Option<String>,
    /// 知识点 → 正确率（0..=1）
    #[serde(default)]
    pub accuracy: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Student {
    /// 正确率低于阈值的知识点
    pub fn weak_topics(&self) -> Vec<String> {
        self.accuracy
            .iter()
            .filter(|(_, acc)| **acc < WEAK_ACCURACY_THRESHOLD)
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

/// 一次批改记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub grade_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet_id: Option<String>,
    /// 形如 `80%` 或 `8/10`
    pub score: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub insights: String,
    /// RFC 3339 时间戳，二级索引按此排序
    pub graded_at: String,
}

impl GradeRecord {
    /// 分数换算为百分比，无法识别时按 0 处理
    pub fn score_percent(&self) -> f64 {
        let score = self.score.trim();
        if let Some((correct, total)) = score.split_once('/') {
            let correct: f64 = correct.trim().parse().unwrap_or(0.0);
            let total: f64 = total.trim().parse().unwrap_or(0.0);
            return if total > 0.0 { correct / total * 100.0 } else { 0.0 };
        }
        score.trim_end_matches('%').trim().parse().unwrap_or(0.0)
    }
}

/// 参与"近期"平均分的记录数
const RECENT_WINDOW: usize = 5;

/// 成绩走势
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeTrend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl GradeTrend {
    /// 由按时间倒序排列的记录计算走势
    ///
    /// 最近 5 条的平均分与更早记录的平均分比较；
    /// 没有更早记录可比时视为数据不足。
    pub fn from_history(history: &[GradeRecord]) -> Self {
        if history.len() <= RECENT_WINDOW {
            return GradeTrend::InsufficientData;
        }
        let average = |records: &[GradeRecord]| {
            records.iter().map(GradeRecord::score_percent).sum::<f64>() / records.len() as f64
        };
        let (recent, older) = history.split_at(RECENT_WINDOW);
        let (recent, older) = (average(recent), average(older));
        if recent > older {
            GradeTrend::Improving
        } else if recent < older {
            GradeTrend::Declining
        } else {
            GradeTrend::Stable
        }
    }
}
