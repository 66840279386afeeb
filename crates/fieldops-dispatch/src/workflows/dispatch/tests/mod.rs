mod common;

mod eligibility;
