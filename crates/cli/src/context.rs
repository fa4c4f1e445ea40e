//! Operator context: resolves the acting user, authorizes, then dispatches an
//! [`Operation`] to the workflow or the donor registry.

use anyhow::{Context as _, anyhow};
use serde::Serialize;
use serde_json::Value;

use bloodbank_auth::{Actor, authorize};
use bloodbank_core::BloodGroup;
use bloodbank_donors::{DonorProfile, DonorQuery};
use bloodbank_infra::store::{DonorDirectory, LedgerStore, UserDirectory};
use bloodbank_infra::{DonorRegistry, FulfillmentWorkflow, Outcome, WorkflowError};
use bloodbank_requests::{NewRequest, RequestQuery};

use crate::args::{DonorCommand, DonorFields, Operation, RequestsCommand, SubmitRequestArgs};

/// Result printed for one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Report {
    fn from_result<T: Serialize>(result: Result<T, WorkflowError>, message: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => Report {
                outcome: Outcome {
                    success: true,
                    kind: None,
                    message: message(&value),
                },
                data: serde_json::to_value(&value).ok(),
            },
            Err(err) => Report::failure(err),
        }
    }

    fn from_outcome(outcome: Outcome) -> Self {
        Report { outcome, data: None }
    }

    fn failure(err: WorkflowError) -> Self {
        Report::from_outcome(Err::<String, _>(err).into())
    }
}

pub struct OperatorContext<L, D, U> {
    workflow: FulfillmentWorkflow<L>,
    donors: DonorRegistry<D>,
    users: U,
}

impl<L, D, U> OperatorContext<L, D, U>
where
    L: LedgerStore,
    D: DonorDirectory,
    U: UserDirectory,
{
    pub fn new(ledger: L, donors: D, users: U) -> Self {
        Self {
            workflow: FulfillmentWorkflow::new(ledger),
            donors: DonorRegistry::new(donors),
            users,
        }
    }

    /// Look up `username` and check it may run `operation`.
    ///
    /// Unknown users and missing permissions are errors, not failed outcomes:
    /// the operation is never attempted.
    pub async fn resolve_actor(&self, username: Option<&str>, operation: &Operation) -> anyhow::Result<Actor> {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("an operator is required: pass --user or set BLOODBANK_USER"))?;
        let actor = self
            .users
            .find_by_username(username)
            .await
            .context("looking up operator")?
            .ok_or_else(|| anyhow!("unknown user '{username}'"))?;
        if let Some(permission) = operation.required_permission() {
            authorize(&actor, &permission)?;
        }
        Ok(actor)
    }

    pub async fn run(&self, username: Option<&str>, operation: Operation) -> anyhow::Result<Report> {
        let actor = self.resolve_actor(username, &operation).await?;
        tracing::debug!(user = %actor.username, ?operation, "running operation");

        let report = match operation {
            Operation::SubmitRequest(args) => match new_request(args) {
                Ok(request) => Report::from_result(self.workflow.submit_request(request).await, |r| {
                    format!("request {} submitted", r.id)
                }),
                Err(err) => Report::failure(err),
            },
            Operation::Approve { request_id } => {
                Report::from_outcome(self.workflow.approve(request_id, &actor).await.into())
            }
            Operation::Reject { request_id } => Report::from_outcome(self.workflow.reject(request_id).await.into()),
            Operation::Requests(RequestsCommand::List { search, status }) => {
                match RequestQuery::parse(search.as_deref(), status.as_deref()) {
                    Ok(query) => Report::from_result(self.workflow.requests(&query).await, |found| {
                        format!("{} request(s) found", found.len())
                    }),
                    Err(err) => Report::failure(err.into()),
                }
            }
            Operation::AddStock { blood, units } => {
                Report::from_outcome(self.workflow.add_stock(&blood, units).await.into())
            }
            Operation::Donor(command) => self.run_donor(command).await,
        };
        Ok(report)
    }

    async fn run_donor(&self, command: DonorCommand) -> Report {
        match command {
            DonorCommand::Add { fields, dob, gender } => {
                let profile = donor_profile(fields).and_then(|mut p| {
                    p.date_of_birth = dob;
                    if let Some(g) = gender {
                        p.gender = g.parse()?;
                    }
                    Ok(p)
                });
                match profile {
                    Ok(p) => Report::from_result(self.donors.add(p).await, |d| format!("donor {} registered", d.id)),
                    Err(err) => Report::failure(err),
                }
            }
            DonorCommand::Update { donor_id, fields } => match donor_profile(fields) {
                Ok(p) => Report::from_result(self.donors.update(donor_id, p).await, |d| {
                    format!("donor {} updated", d.id)
                }),
                Err(err) => Report::failure(err),
            },
            DonorCommand::Delete { donor_id } => Report::from_outcome(
                self.donors
                    .delete(donor_id)
                    .await
                    .map(|()| format!("donor {donor_id} deleted"))
                    .into(),
            ),
            DonorCommand::List { search, blood } => {
                let query = DonorQuery::parse(search.as_deref(), blood.as_deref()).map_err(WorkflowError::from);
                match query {
                    Ok(q) => Report::from_result(self.donors.search(&q).await, |found| {
                        format!("{} donor(s) found", found.len())
                    }),
                    Err(err) => Report::failure(err),
                }
            }
        }
    }
}

fn new_request(args: SubmitRequestArgs) -> Result<NewRequest, WorkflowError> {
    let group: BloodGroup = args.blood.parse()?;
    Ok(NewRequest::new(args.hospital, group, args.units)
        .with_city(args.city)
        .with_notes(args.notes))
}

fn donor_profile(fields: DonorFields) -> Result<DonorProfile, WorkflowError> {
    let group: BloodGroup = fields.blood.parse()?;
    Ok(DonorProfile::new(fields.name, group, fields.phone)
        .with_email(fields.email)
        .with_city(fields.city))
}
