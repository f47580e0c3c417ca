//! REST paths of the backend, relative to the configured base URL.

use std::fmt::Display;

pub const HEALTH: &str = "/health";

pub mod auth {
    pub const LOGIN: &str = "/auth/login";
    pub const REGISTER: &str = "/auth/register";
    pub const LOGOUT: &str = "/auth/logout";
    pub const REFRESH: &str = "/auth/refresh";
    pub const PROFILE: &str = "/auth/profile";
    pub const FORGOT_PASSWORD: &str = "/auth/forgot-password";
    pub const RESET_PASSWORD: &str = "/auth/reset-password";
    pub const VERIFY_RESET_CODE: &str = "/auth/verify-reset-code";
}

pub mod user {
    use super::*;

    pub const LIST: &str = "/users";
    pub const PROFILE: &str = "/users/profile";
    pub const CHANGE_PASSWORD: &str = "/users/change-password";

    pub fn detail(id: impl Display) -> String {
        format!("/users/{id}")
    }

    pub fn status(id: impl Display) -> String {
        format!("/users/{id}/status")
    }

    pub fn reset_password(id: impl Display) -> String {
        format!("/users/{id}/reset-password")
    }
}

pub mod pest {
    use super::*;

    pub const LIST: &str = "/pest/list";
    pub const IDENTIFY: &str = "/pest/identify";
    pub const HISTORY: &str = "/pest/identification/history";

    pub fn detail(id: impl Display) -> String {
        format!("/pest/{id}")
    }

    pub fn identification_record(id: impl Display) -> String {
        format!("/pest/identification/{id}")
    }
}

pub mod treatment {
    use super::*;

    pub const PLANS: &str = "/treatment/plans";
    pub const GENERATE: &str = "/treatment/generate";
    pub const PROGRESS: &str = "/treatment/progress";

    pub fn plan(id: impl Display) -> String {
        format!("/treatment/plans/{id}")
    }

    pub fn tasks(plan_id: impl Display) -> String {
        format!("/treatment/plans/{plan_id}/tasks")
    }

    pub fn task_status(task_id: impl Display) -> String {
        format!("/treatment/tasks/{task_id}/status")
    }
}

pub mod pesticide {
    use super::*;

    pub const LIST: &str = "/pesticide/list";
    pub const CREATE: &str = "/pesticide";
    pub const STOCK_UPDATE: &str = "/pesticide/stock/update";
    pub const ALERTS: &str = "/pesticide/alerts";
    pub const USAGE_STATS: &str = "/pesticide/usage/stats";

    pub fn item(id: impl Display) -> String {
        format!("/pesticide/{id}")
    }

    pub fn usage(id: impl Display) -> String {
        format!("/pesticide/{id}/usage")
    }
}

pub mod evaluation {
    use super::*;

    pub const LIST: &str = "/evaluation/list";
    pub const CREATE: &str = "/evaluation";
    pub const COMPARISON: &str = "/evaluation/comparison";
    pub const STATS: &str = "/evaluation/stats";

    pub fn item(id: impl Display) -> String {
        format!("/evaluation/{id}")
    }

    pub fn report(id: impl Display) -> String {
        format!("/evaluation/{id}/report")
    }
}

pub mod prediction {
    use super::*;

    pub const LIST: &str = "/prediction/list";
    pub const WARNINGS: &str = "/prediction/warnings";
    pub const PREDICT: &str = "/prediction/predict";
    pub const WARNING_MAP: &str = "/prediction/warnings/map";
    pub const WARNING_STATS: &str = "/prediction/warnings/stats";
    pub const ACCURACY: &str = "/prediction/accuracy";

    pub fn warning_status(id: impl Display) -> String {
        format!("/prediction/warnings/{id}/status")
    }
}

pub mod forest {
    use super::*;

    pub const RESOURCES: &str = "/forest/resources";
    pub const KNOWLEDGE: &str = "/forest/knowledge";
    pub const KNOWLEDGE_SEARCH: &str = "/forest/knowledge/search";

    pub fn resource(id: impl Display) -> String {
        format!("/forest/resources/{id}")
    }

    pub fn knowledge_entry(id: impl Display) -> String {
        format!("/forest/knowledge/{id}")
    }
}
