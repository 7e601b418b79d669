use serde::{Deserialize, Serialize};

use crate::contacts::repo_types::{ContactMessage, ContactStatus};
use crate::response::Pagination;

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ContactStatus,
}

#[derive(Debug, Deserialize)]
pub struct ContactListQuery {
    pub status: Option<ContactStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ContactListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct ContactEnvelope {
    pub contact: ContactMessage,
}
