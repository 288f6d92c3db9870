//! Schemas of the forms the HRMS front-end validates.
//!
//! Each form builds its schema from here so that the admin console and the
//! self-service portal reject the same input with the same messages.

use std::sync::LazyLock;

use regex::Regex;

use super::rules::{FormSchema, RuleDescriptor};

/// `YYYY-MM-DD`, as produced by date inputs.
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

const MIN_PASSWORD_LENGTH: usize = 8;

fn date(label: &str) -> RuleDescriptor {
    RuleDescriptor::pattern(DATE_RE.clone()).with_message(format!("{label} must be a valid date"))
}

/// Admin and employee sign-in.
pub fn login() -> FormSchema {
    FormSchema::new()
        .field(
            "email",
            vec![
                RuleDescriptor::required().with_message("Email is required"),
                RuleDescriptor::email().with_message("Please enter a valid email"),
            ],
        )
        .field(
            "password",
            vec![
                RuleDescriptor::required().with_message("Password is required"),
                RuleDescriptor::min_length(6)
                    .with_message("Password must be at least 6 characters"),
            ],
        )
}

/// Settings > change password.
pub fn change_password() -> FormSchema {
    FormSchema::new()
        .field(
            "currentPassword",
            vec![RuleDescriptor::required().with_message("Current password is required")],
        )
        .field(
            "newPassword",
            vec![
                RuleDescriptor::required().with_message("New password is required"),
                RuleDescriptor::min_length(MIN_PASSWORD_LENGTH).with_message(format!(
                    "Password must be at least {MIN_PASSWORD_LENGTH} characters"
                )),
            ],
        )
        .field(
            "confirmPassword",
            vec![
                RuleDescriptor::required().with_message("Please confirm the new password"),
                RuleDescriptor::matches("newPassword").with_message("Passwords do not match"),
            ],
        )
}

/// Admin console > add employee.
pub fn employee_onboarding() -> FormSchema {
    FormSchema::new()
        .field(
            "firstName",
            vec![
                RuleDescriptor::required().with_message("First name is required"),
                RuleDescriptor::max_length(50),
            ],
        )
        .field(
            "lastName",
            vec![
                RuleDescriptor::required().with_message("Last name is required"),
                RuleDescriptor::max_length(50),
            ],
        )
        .field(
            "email",
            vec![
                RuleDescriptor::required().with_message("Email is required"),
                RuleDescriptor::email().with_message("Please enter a valid email"),
            ],
        )
        .field("phone", vec![RuleDescriptor::phone()])
        .field(
            "designation",
            vec![RuleDescriptor::required().with_message("Designation is required")],
        )
        .field(
            "salary",
            vec![
                RuleDescriptor::number().with_message("Salary must be a number"),
                RuleDescriptor::min(0.0).with_message("Salary cannot be negative"),
            ],
        )
        .field(
            "joiningDate",
            vec![
                RuleDescriptor::required().with_message("Joining date is required"),
                date("Joining date"),
            ],
        )
}

/// Self-service portal > request leave.
pub fn leave_request() -> FormSchema {
    FormSchema::new()
        .field(
            "leaveType",
            vec![RuleDescriptor::required().with_message("Please select a leave type")],
        )
        .field(
            "startDate",
            vec![
                RuleDescriptor::required().with_message("Start date is required"),
                date("Start date"),
            ],
        )
        .field(
            "endDate",
            vec![
                RuleDescriptor::required().with_message("End date is required"),
                date("End date"),
            ],
        )
        .field(
            "reason",
            vec![
                RuleDescriptor::required().with_message("Reason is required"),
                RuleDescriptor::min_length(10)
                    .with_message("Please give at least 10 characters"),
                RuleDescriptor::max_length(500),
            ],
        )
}

/// Public site > register a company. The wizard validates one step's fields
/// at a time through `validate_form(Some(..))`.
pub fn company_registration() -> FormSchema {
    FormSchema::new()
        .field(
            "companyName",
            vec![
                RuleDescriptor::required().with_message("Company name is required"),
                RuleDescriptor::min_length(2),
            ],
        )
        .field(
            "email",
            vec![
                RuleDescriptor::required().with_message("Email is required"),
                RuleDescriptor::email().with_message("Please enter a valid email"),
            ],
        )
        .field(
            "phone",
            vec![
                RuleDescriptor::required().with_message("Phone number is required"),
                RuleDescriptor::phone().with_message("Please enter a valid phone number"),
            ],
        )
        .field(
            "employeeCount",
            vec![
                RuleDescriptor::number().with_message("Employee count must be a number"),
                RuleDescriptor::min(1.0).with_message("At least one employee is required"),
            ],
        )
        .field(
            "adminPassword",
            vec![
                RuleDescriptor::required().with_message("Password is required"),
                RuleDescriptor::min_length(MIN_PASSWORD_LENGTH),
            ],
        )
        .field(
            "confirmPassword",
            vec![
                RuleDescriptor::required().with_message("Please confirm the password"),
                RuleDescriptor::matches("adminPassword").with_message("Passwords do not match"),
            ],
        )
}
