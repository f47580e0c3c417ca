//! Known application codes and their user-facing messages.

/// Message used when a code has no entry in the table.
pub const DEFAULT_MESSAGE: &str = "Request failed";

/// Application codes the backend is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalError,
    UserNotFound,
    UserAlreadyExists,
    InvalidPassword,
    TokenExpired,
    InvalidToken,
    PestNotFound,
    IdentificationFailed,
    PlanNotFound,
    PlanAlreadyExists,
    PesticideNotFound,
    InsufficientStock,
    EvaluationNotFound,
    InvalidEvaluationData,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 19] = [
        ErrorCode::Success,
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::InternalError,
        ErrorCode::UserNotFound,
        ErrorCode::UserAlreadyExists,
        ErrorCode::InvalidPassword,
        ErrorCode::TokenExpired,
        ErrorCode::InvalidToken,
        ErrorCode::PestNotFound,
        ErrorCode::IdentificationFailed,
        ErrorCode::PlanNotFound,
        ErrorCode::PlanAlreadyExists,
        ErrorCode::PesticideNotFound,
        ErrorCode::InsufficientStock,
        ErrorCode::EvaluationNotFound,
        ErrorCode::InvalidEvaluationData,
    ];

    pub fn code(self) -> i64 {
        match self {
            ErrorCode::Success => 200,
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::InternalError => 500,
            ErrorCode::UserNotFound => 1001,
            ErrorCode::UserAlreadyExists => 1002,
            ErrorCode::InvalidPassword => 1003,
            ErrorCode::TokenExpired => 1004,
            ErrorCode::InvalidToken => 1005,
            ErrorCode::PestNotFound => 2001,
            ErrorCode::IdentificationFailed => 2002,
            ErrorCode::PlanNotFound => 3001,
            ErrorCode::PlanAlreadyExists => 3002,
            ErrorCode::PesticideNotFound => 4001,
            ErrorCode::InsufficientStock => 4002,
            ErrorCode::EvaluationNotFound => 5001,
            ErrorCode::InvalidEvaluationData => 5002,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "OK",
            ErrorCode::BadRequest => "Invalid request parameters",
            ErrorCode::Unauthorized => "Unauthorized access",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::UserNotFound => "User does not exist",
            ErrorCode::UserAlreadyExists => "User already exists",
            ErrorCode::InvalidPassword => "Incorrect password",
            ErrorCode::TokenExpired => "Login has expired",
            ErrorCode::InvalidToken => "Invalid access token",
            ErrorCode::PestNotFound => "Pest record does not exist",
            ErrorCode::IdentificationFailed => "Identification failed",
            ErrorCode::PlanNotFound => "Treatment plan does not exist",
            ErrorCode::PlanAlreadyExists => "Treatment plan already exists",
            ErrorCode::PesticideNotFound => "Pesticide does not exist",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::EvaluationNotFound => "Evaluation record does not exist",
            ErrorCode::InvalidEvaluationData => "Invalid evaluation data",
        }
    }

    /// Codes that mean the access token was rejected.
    pub fn is_auth_failure(self) -> bool {
        matches!(
            self,
            ErrorCode::Unauthorized | ErrorCode::TokenExpired | ErrorCode::InvalidToken
        )
    }
}

/// Table lookup for a failure code. `None` for success and unmapped codes.
pub fn message_for(code: i64) -> Option<&'static str> {
    ErrorCode::from_code(code)
        .filter(|c| *c != ErrorCode::Success)
        .map(ErrorCode::message)
}

pub fn is_auth_code(code: i64) -> bool {
    ErrorCode::from_code(code).is_some_and(ErrorCode::is_auth_failure)
}
