//! Shell-command provider for provflow
//!
//! This crate implements the `Provider` trait by running configured command
//! lines, one set per resource kind. Any cloud CLI (aws, gcloud, usacloud, ...)
//! can be driven this way without provider-specific code.
//!
//! # Example
//!
//! ```kdl
//! provider "exec" {
//!     timeout 120
//!     auth "aws sts get-caller-identity --query Arn --output text"
//!     kind "network" {
//!         lookup   "aws ec2 describe-vpcs --filters Name=tag:Name,Values=$PROV_FILTER_NAME --query 'Vpcs[0].VpcId' --output text | grep -v None || true"
//!         create   "aws ec2 create-vpc --cidr-block $PROV_PARAM_CIDR --query Vpc.VpcId --output text"
//!         describe "aws ec2 describe-vpcs --vpc-ids $PROV_EXTERNAL_ID --query 'Vpcs[0].State' --output text"
//!         delete   "aws ec2 delete-vpc --vpc-id $PROV_EXTERNAL_ID"
//!     }
//! }
//! ```
//!
//! # Environment
//!
//! - `PROV_KIND`: resource kind
//! - `PROV_FILTER_<KEY>` / `PROV_FILTER_JSON`: lookup filter (lookup)
//! - `PROV_PARAM_<KEY>` / `PROV_PARAMS_JSON`: create parameters (create)
//! - `PROV_EXTERNAL_ID`: provider id (describe, delete)

pub mod error;
pub mod provider;
pub mod shell;

pub use error::{ExecError, Result};
pub use provider::ExecProvider;
pub use shell::Shell;
