/*
 * Responsibility
 * - Access rules of this API, one per (resource type, action)
 * - Ownership predicates backed by the repos
 *
 * Rules
 * - ADMIN passes every rule through the role shortcut
 * - project: the creator may update/delete
 * - task: the assignee or the parent project's creator may update, only the latter may delete
 */
use std::sync::Arc;

use async_trait::async_trait;

use crate::repos::{ProjectRepo, TaskRepo};
use crate::services::auth::Principal;
use crate::services::authz::{
    AccessPolicy, Action, AnyOf, OwnershipCheck, OwnershipError, PolicyTable, ResourceRef,
};

pub const ADMIN: &str = "ADMIN";
pub const USER: &str = "USER";

pub const PROJECT: &str = "project";
pub const TASK: &str = "task";
pub const SESSION: &str = "session";

/// Rate domain of the authentication endpoints.
pub const AUTH_CLASS: &str = "auth";

fn numeric_id(resource: &ResourceRef) -> Option<u64> {
    resource.id.as_deref()?.parse().ok()
}

/// Principal created the project named by the resource id.
#[derive(Debug, Clone)]
pub struct IsProjectCreator {
    projects: ProjectRepo,
}

#[async_trait]
impl OwnershipCheck for IsProjectCreator {
    fn name(&self) -> &'static str {
        "is_project_creator"
    }

    async fn check(
        &self,
        principal: &Principal,
        resource: &ResourceRef,
    ) -> Result<bool, OwnershipError> {
        let Some(project_id) = numeric_id(resource) else {
            return Ok(false);
        };
        Ok(self
            .projects
            .get(project_id)
            .is_some_and(|p| p.created_by == principal.subject()))
    }
}

/// Principal is assigned to the task named by the resource id.
#[derive(Debug, Clone)]
pub struct IsTaskAssignee {
    tasks: TaskRepo,
}

#[async_trait]
impl OwnershipCheck for IsTaskAssignee {
    fn name(&self) -> &'static str {
        "is_task_assignee"
    }

    async fn check(
        &self,
        principal: &Principal,
        resource: &ResourceRef,
    ) -> Result<bool, OwnershipError> {
        let Some(task_id) = numeric_id(resource) else {
            return Ok(false);
        };
        Ok(self
            .tasks
            .get(task_id)
            .is_some_and(|t| t.assigned_to.as_deref() == Some(principal.subject())))
    }
}

/// Principal created the project the task belongs to.
#[derive(Debug, Clone)]
pub struct IsTaskProjectCreator {
    tasks: TaskRepo,
    projects: ProjectRepo,
}

#[async_trait]
impl OwnershipCheck for IsTaskProjectCreator {
    fn name(&self) -> &'static str {
        "is_task_project_creator"
    }

    async fn check(
        &self,
        principal: &Principal,
        resource: &ResourceRef,
    ) -> Result<bool, OwnershipError> {
        let Some(task_id) = numeric_id(resource) else {
            return Ok(false);
        };
        let Some(task) = self.tasks.get(task_id) else {
            return Ok(false);
        };

        // A task whose project is gone means the stores disagree.
        let project = self.projects.get(task.project_id).ok_or_else(|| {
            OwnershipError::Lookup(format!(
                "task {} references missing project {}",
                task.task_id, task.project_id
            ))
        })?;
        Ok(project.created_by == principal.subject())
    }
}

/// Any verified principal. Used where holding a valid credential is the whole rule.
#[derive(Debug, Clone, Copy)]
pub struct IsAuthenticated;

#[async_trait]
impl OwnershipCheck for IsAuthenticated {
    fn name(&self) -> &'static str {
        "is_authenticated"
    }

    async fn check(&self, _: &Principal, _: &ResourceRef) -> Result<bool, OwnershipError> {
        Ok(true)
    }
}

pub fn build_policies(projects: &ProjectRepo, tasks: &TaskRepo) -> PolicyTable {
    let project_creator: Arc<dyn OwnershipCheck> = Arc::new(IsProjectCreator {
        projects: projects.clone(),
    });
    let task_project_creator: Arc<dyn OwnershipCheck> = Arc::new(IsTaskProjectCreator {
        tasks: tasks.clone(),
        projects: projects.clone(),
    });
    let task_assignee_or_owner: Arc<dyn OwnershipCheck> = Arc::new(AnyOf::new(
        "is_task_assignee_or_project_creator",
        vec![
            Arc::new(IsTaskAssignee {
                tasks: tasks.clone(),
            }),
            task_project_creator.clone(),
        ],
    ));

    let members = || AccessPolicy::roles([USER, ADMIN]);
    let admins_or = |check: &Arc<dyn OwnershipCheck>| {
        AccessPolicy::roles([ADMIN]).with_shared_ownership(check.clone())
    };

    PolicyTable::new()
        .with(SESSION, Action::Read, AccessPolicy::deny_all().with_ownership(IsAuthenticated))
        .with(PROJECT, Action::Read, members())
        .with(PROJECT, Action::Create, members())
        .with(PROJECT, Action::Update, admins_or(&project_creator))
        .with(PROJECT, Action::Delete, admins_or(&project_creator))
        // resource is the parent project for listing and creating tasks
        .with(TASK, Action::List, members())
        .with(TASK, Action::Create, admins_or(&project_creator))
        .with(TASK, Action::Read, members())
        .with(TASK, Action::Update, admins_or(&task_assignee_or_owner))
        .with(TASK, Action::Delete, admins_or(&task_project_creator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authz::{AuthzEngine, Decision, DenyReason};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn principal(sub: &str, roles: &[&str]) -> Principal {
        let exp = Utc.timestamp_opt(2_000_000_000, 0).unwrap();
        Principal::new(sub, roles.iter().copied(), None, exp)
    }

    struct World {
        projects: ProjectRepo,
        tasks: TaskRepo,
        table: PolicyTable,
        engine: AuthzEngine,
    }

    fn world() -> World {
        let projects = ProjectRepo::new();
        let tasks = TaskRepo::new();
        let table = build_policies(&projects, &tasks);
        World {
            projects,
            tasks,
            table,
            engine: AuthzEngine::new(Duration::from_millis(100)),
        }
    }

    impl World {
        async fn decide(
            &self,
            who: &Principal,
            kind: &'static str,
            action: Action,
            id: u64,
        ) -> Decision {
            let policy = self.table.get(kind, action).unwrap();
            self.engine
                .authorize(who, policy, &ResourceRef::new(kind, id.to_string()))
                .await
        }
    }

    #[tokio::test]
    async fn project_creator_may_update_others_may_not() {
        let w = world();
        let p = w.projects.create("alpha", "", "alice");

        let alice = principal("alice", &["USER"]);
        let bob = principal("bob", &["USER"]);
        let admin = principal("root", &["ROLE_ADMIN"]);

        assert!(w.decide(&alice, PROJECT, Action::Update, p.project_id).await.is_allowed());
        assert_eq!(
            w.decide(&bob, PROJECT, Action::Update, p.project_id).await,
            Decision::Deny(DenyReason::NotOwner)
        );
        assert!(w.decide(&admin, PROJECT, Action::Delete, p.project_id).await.is_allowed());
    }

    #[tokio::test]
    async fn task_assignee_may_update_but_not_delete() {
        let w = world();
        let p = w.projects.create("alpha", "", "alice");
        let t = w.tasks.create(p.project_id, "write docs", Some("bob"), "alice");

        let bob = principal("bob", &["USER"]);
        let alice = principal("alice", &["USER"]);

        assert!(w.decide(&bob, TASK, Action::Update, t.task_id).await.is_allowed());
        assert!(!w.decide(&bob, TASK, Action::Delete, t.task_id).await.is_allowed());
        assert!(w.decide(&alice, TASK, Action::Update, t.task_id).await.is_allowed());
        assert!(w.decide(&alice, TASK, Action::Delete, t.task_id).await.is_allowed());
    }

    #[tokio::test]
    async fn missing_resource_is_not_owned() {
        let w = world();
        let alice = principal("alice", &["USER"]);

        assert_eq!(
            w.decide(&alice, PROJECT, Action::Update, 404).await,
            Decision::Deny(DenyReason::NotOwner)
        );
    }

    #[tokio::test]
    async fn orphaned_task_fails_the_lookup() {
        let w = world();
        let p = w.projects.create("alpha", "", "alice");
        let t = w.tasks.create(p.project_id, "orphan", None, "alice");
        w.projects.delete(p.project_id);

        let carol = principal("carol", &["USER"]);
        assert_eq!(
            w.decide(&carol, TASK, Action::Delete, t.task_id).await,
            Decision::Deny(DenyReason::LookupFailed)
        );
    }

    #[tokio::test]
    async fn roleless_principal_can_still_read_its_session() {
        let w = world();
        let nobody = principal("nobody", &[]);
        let policy = w.table.get(SESSION, Action::Read).unwrap();

        let decision = w
            .engine
            .authorize(&nobody, policy, &ResourceRef::collection(SESSION))
            .await;
        assert!(decision.is_allowed());
        assert!(!w.decide(&nobody, PROJECT, Action::Read, 1).await.is_allowed());
    }
}
