/// Column name constants shared by the cleaning pipeline and the analytics.
/// Names match the CRM export headers exactly.

// Shared
pub const ID: &str = "Id";
pub const CREATED_TIME: &str = "Created Time";
pub const SOURCE: &str = "Source";
pub const CAMPAIGN: &str = "Campaign";

// Contacts
pub const CONTACT_OWNER: &str = "Contact Owner Name";
pub const MODIFIED_TIME: &str = "Modified Time";

// Calls
pub const CALL_START_TIME: &str = "Call Start Time";
pub const CALL_OWNER: &str = "Call Owner Name";
pub const CONTACT_ID: &str = "CONTACTID";
pub const CALL_TYPE: &str = "Call Type";
pub const CALL_DURATION: &str = "Call Duration (in seconds)";
pub const CALL_STATUS: &str = "Call Status";
pub const OUTGOING_CALL_STATUS: &str = "Outgoing Call Status";
pub const SCHEDULED_IN_CRM: &str = "Scheduled in CRM";

// Spend
pub const DATE: &str = "Date";
pub const IMPRESSIONS: &str = "Impressions";
pub const SPEND: &str = "Spend";
pub const CLICKS: &str = "Clicks";
pub const ADGROUP: &str = "AdGroup";
pub const AD: &str = "Ad";

// Deals
pub const DEAL_OWNER: &str = "Deal Owner Name";
pub const CLOSING_DATE: &str = "Closing Date";
pub const QUALITY: &str = "Quality";
pub const STAGE: &str = "Stage";
pub const LOST_REASON: &str = "Lost Reason";
pub const PAGE: &str = "Page";
pub const SLA: &str = "SLA";
pub const CONTENT: &str = "Content";
pub const TERM_ADGROUP: &str = "Term (AdGroup)";
pub const PAYMENT_TYPE: &str = "Payment Type";
pub const PRODUCT: &str = "Product";
pub const EDUCATION_TYPE: &str = "Education Type";
pub const COURSE_DURATION: &str = "Course duration";
pub const MONTHS_OF_STUDY: &str = "Months of study";
pub const INITIAL_AMOUNT_PAID: &str = "Initial Amount Paid";
pub const OFFER_TOTAL_AMOUNT: &str = "Offer Total Amount";
pub const CONTACT_NAME: &str = "Contact Name";
pub const CITY: &str = "City";
pub const LEVEL_OF_DEUTSCH: &str = "Level of Deutsch";

// Derived deal fields
pub const IS_PAID: &str = "is_paid";
pub const IS_LOST: &str = "is_lost";
pub const IS_CLOSED: &str = "is_closed";
pub const REVENUE: &str = "revenue";
pub const SLA_HOURS: &str = "sla_hours";
pub const LIFETIME_DAYS: &str = "lifetime_days";
pub const MONTH: &str = "month";
pub const LEVEL_NORM: &str = "level_norm";
pub const CALLS_CNT: &str = "calls_cnt";
pub const HAS_CALL: &str = "has_call";

/// Value used to fill missing categories
pub const UNKNOWN: &str = "unknown";

/// Placeholder the CRM uses for "no city"
pub const NO_CITY: &str = "-";

// Report and artifact file stems
pub const IMPORT_REPORT: &str = "import_checklist";
pub const CLEANING_REPORT: &str = "cleaning_summary";
pub const FULL_REPORT: &str = "full_report.md";
pub const UE_REPORT: &str = "unit_economics.md";
pub const CITY_COORDS_FILE: &str = "city_coords.parquet";

/// Products tracked separately in the unit economics
pub const PRODUCTS: [&str; 3] = ["Web Developer", "Digital Marketing", "UX/UI Design"];
