/// Employee, user and company ids issued by the HRMS backend.
pub type DbId = i64;
