use crate::api::balance::{
    AccrualFailure, AccrualRunReq, AccrualRunSummary, AdjustmentReq, AvailableQuery,
    AvailableResponse, BalanceFilter, BalanceListResponse, CoverageQuery, CoverageResponse,
};
use crate::api::employee::{CreateEmployee, EmployeeListResponse, EmployeeQuery};
use crate::api::leave_request::{CreateLeave, LeaveFilter, LeaveListResponse, RejectLeave};
use crate::api::policy::{CreatePolicy, PolicyFilter, PolicyListResponse, UpdatePolicy};
use crate::model::employee::Employee;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_policy::{AccrualCadence, LeavePolicy, LeaveUnit};
use crate::model::leave_request::{LeaveRequest, RequestStatus};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leave Ledger API",
        version = "1.0.0",
        description = r#"
## Leave Accrual & Balance Ledger

This API powers the **leave accrual and balance engine** of an HR platform: per-period
balance ledgers, prorated accrual, carry-over enforcement, and a request workflow that
spends balance only on approval.

### 🔹 Key Features
- **Policy Management**
  - Define leave types per company with a structured accrual rule and carry-over cap
- **Balance Ledger**
  - One row per employee, policy and period; closing always equals opening + accrued + adjusted - taken
- **Accrual Runs**
  - Open the next period for a company, prorating by calendar days and forfeiting balance above the cap
- **Request Workflow**
  - Draft → submitted → approved/rejected/cancelled, with available balance re-checked at approval
- **Balance Projection**
  - Available balance as of any date, net of pending requests

### 🔐 Security
Most endpoints are protected using **JWT Bearer authentication**.
Only authorized roles such as **Admin** or **HR** can access sensitive operations;
accrual runs additionally accept the **System** role used by schedulers.

### 📦 Response Format
- JSON-based RESTful responses
- Balance quantities are decimal strings with two fractional digits (`"6.16"`)
- Pagination supported for list endpoints

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::submit_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::policy::create_policy,
        crate::api::policy::list_policies,
        crate::api::policy::get_policy,
        crate::api::policy::update_policy,

        crate::api::balance::list_balances,
        crate::api::balance::available_balance,
        crate::api::balance::check_coverage,
        crate::api::balance::post_adjustment,
        crate::api::balance::run_accrual,

        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::list_employees,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee
    ),
    components(
        schemas(
            CreateLeave,
            RejectLeave,
            LeaveFilter,
            LeaveListResponse,
            LeaveRequest,
            RequestStatus,
            CreatePolicy,
            UpdatePolicy,
            PolicyFilter,
            PolicyListResponse,
            LeavePolicy,
            LeaveUnit,
            AccrualCadence,
            BalanceFilter,
            BalanceListResponse,
            AvailableQuery,
            AvailableResponse,
            CoverageQuery,
            CoverageResponse,
            AdjustmentReq,
            AccrualRunReq,
            AccrualRunSummary,
            AccrualFailure,
            LeaveBalance,
            CreateEmployee,
            EmployeeQuery,
            Employee,
            EmployeeListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Policy", description = "Leave policy management APIs"),
        (name = "Balance", description = "Balance ledger and accrual APIs"),
        (name = "Leave", description = "Leave request workflow APIs"),
        (name = "Employee", description = "Employee management APIs"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
