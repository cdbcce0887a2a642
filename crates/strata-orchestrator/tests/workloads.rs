//! Deploys, services, and tasks on top of an environment.

mod common;

use std::collections::BTreeMap;

use common::*;
use strata_core::{
    ContainerOverride, CreateDeployRequest, CreateServiceRequest, CreateTaskRequest, Deploy,
    Environment, UpdateServiceRequest,
};
use strata_orchestrator::OrchestratorError;

const DOCUMENT: &str = r#"{"containerDefinitions": [{"name": "web", "image": "nginx"}]}"#;

async fn environment(h: &Harness) -> Environment {
    h.orchestrator
        .environments
        .create(environment_request("prod", "linux", 1))
        .await
        .unwrap()
}

async fn deploy(h: &Harness, name: &str) -> Deploy {
    h.orchestrator
        .deploys
        .create(CreateDeployRequest {
            deploy_name: name.to_string(),
            document: DOCUMENT.to_string(),
        })
        .await
        .unwrap()
}

fn task_request(env: &Environment, deploy: &Deploy, name: &str, copies: u32) -> CreateTaskRequest {
    CreateTaskRequest {
        environment_id: env.environment_id.clone(),
        deploy_id: deploy.deploy_id.clone(),
        task_name: name.to_string(),
        copies,
        container_overrides: vec![ContainerOverride {
            container_name: "web".to_string(),
            environment_overrides: BTreeMap::from([("MODE".to_string(), "batch".to_string())]),
        }],
    }
}

// ── Deploys ────────────────────────────────────────────────────────

#[tokio::test]
async fn deploys_get_a_revision_per_create() {
    let h = harness();
    let first = deploy(&h, "api").await;
    let second = deploy(&h, "api").await;

    assert!(first.deploy_id.ends_with(".1"));
    assert!(second.deploy_id.ends_with(".2"));
    assert_eq!(second.version, "2");

    let read = h.orchestrator.deploys.read(&second.deploy_id).await.unwrap();
    assert_eq!(read.deploy_name, "api");
    assert_eq!(read.document, DOCUMENT);

    let listed = h.orchestrator.deploys.list().await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn deploy_documents_are_validated() {
    let h = harness();
    let err = h
        .orchestrator
        .deploys
        .create(CreateDeployRequest {
            deploy_name: "api".to_string(),
            document: r#"{"family": "api"}"#.to_string(),
        })
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(h.cloud.calls().await.is_empty());
}

#[tokio::test]
async fn deploy_delete_is_idempotent() {
    let h = harness();
    let d = deploy(&h, "api").await;

    h.orchestrator.deploys.delete(&d.deploy_id).await.unwrap();
    h.orchestrator.deploys.delete(&d.deploy_id).await.unwrap();
    h.orchestrator.deploys.delete("nosuchdeploy.9").await.unwrap();
    h.orchestrator.deploys.delete("garbage").await.unwrap();

    let err = h.orchestrator.deploys.read(&d.deploy_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::DeployNotFound(_)));
    assert!(h.orchestrator.deploys.list().await.unwrap().is_empty());
}

// ── Services ───────────────────────────────────────────────────────

#[tokio::test]
async fn service_lifecycle() {
    let h = harness();
    let env = environment(&h).await;
    let v1 = deploy(&h, "api").await;
    let v2 = deploy(&h, "api").await;

    let services = &h.orchestrator.services;
    let svc = services
        .create(CreateServiceRequest {
            environment_id: env.environment_id.clone(),
            deploy_id: v1.deploy_id.clone(),
            service_name: "frontend".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(svc.status, "ACTIVE");
    assert_eq!(svc.desired_count, 1);
    assert_eq!(svc.deploy_id, v1.deploy_id);

    let svc = services
        .update(
            &svc.service_id,
            UpdateServiceRequest {
                deploy_id: Some(v2.deploy_id.clone()),
                desired_count: Some(3),
            },
        )
        .await
        .unwrap();
    assert_eq!(svc.deploy_id, v2.deploy_id);
    assert_eq!(svc.running_count, 3);

    let listed = services.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].environment_id, env.environment_id);

    services.delete(&svc.service_id).await.unwrap();
    services.delete(&svc.service_id).await.unwrap();
    services.delete("neverexisted").await.unwrap();

    let err = services.read(&svc.service_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ServiceNotFound(_)));

    // With the service gone the environment tears down cleanly.
    h.orchestrator.environments.delete(&env.environment_id).await.unwrap();
}

#[tokio::test]
async fn services_need_an_existing_environment_and_deploy() {
    let h = harness();
    let d = deploy(&h, "api").await;
    let err = h
        .orchestrator
        .services
        .create(CreateServiceRequest {
            environment_id: "ghost".to_string(),
            deploy_id: d.deploy_id.clone(),
            service_name: "frontend".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::EnvironmentNotFound(ref id) if id == "ghost"));

    let env = environment(&h).await;
    let err = h
        .orchestrator
        .services
        .create(CreateServiceRequest {
            environment_id: env.environment_id,
            deploy_id: "ghost.1".to_string(),
            service_name: "frontend".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::DeployNotFound(_)));
}

// ── Tasks ──────────────────────────────────────────────────────────

#[tokio::test]
async fn task_lifecycle() {
    let h = harness();
    let env = environment(&h).await;
    let d = deploy(&h, "migrate").await;

    let tasks = &h.orchestrator.tasks;
    let task = tasks.create(task_request(&env, &d, "migrate-db", 2)).await.unwrap();
    assert_eq!(task.copies, 2);
    assert_eq!(task.running_count, 2);
    assert_eq!(task.pending_count, 0);
    assert_eq!(task.deploy_id, d.deploy_id);

    let listed = tasks.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].task_name, "migrate-db");

    let err = tasks.create(task_request(&env, &d, "migrate-db", 1)).await.unwrap_err();
    assert!(err.is_validation());

    tasks.delete(&task.task_id).await.unwrap();
    tasks.delete(&task.task_id).await.unwrap();
    tasks.delete("neverexisted").await.unwrap();

    let err = tasks.read(&task.task_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TaskNotFound(_)));

    let stopped = h
        .cloud
        .calls()
        .await
        .into_iter()
        .filter(|call| call.starts_with("stop_task "))
        .count();
    assert_eq!(stopped, 2);
}

#[tokio::test]
async fn task_copies_must_be_positive() {
    let h = harness();
    let env = environment(&h).await;
    let d = deploy(&h, "migrate").await;
    let err = h
        .orchestrator
        .tasks
        .create(task_request(&env, &d, "migrate-db", 0))
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn stopping_already_stopped_tasks_is_tolerated() {
    let h = harness();
    let env = environment(&h).await;
    let d = deploy(&h, "migrate").await;
    let task = h
        .orchestrator
        .tasks
        .create(task_request(&env, &d, "once", 1))
        .await
        .unwrap();

    h.cloud
        .fail_next(
            "stop_task",
            strata_provider::ProviderError::new(
                strata_provider::codes::INVALID_PARAMETER,
                "The referenced task was not found.",
            ),
        )
        .await;
    h.orchestrator.tasks.delete(&task.task_id).await.unwrap();
}

#[tokio::test]
async fn task_delete_survives_a_deleted_environment() {
    let h = harness();
    let env = environment(&h).await;
    let d = deploy(&h, "migrate").await;
    let tasks = &h.orchestrator.tasks;
    let task = tasks.create(task_request(&env, &d, "orphan", 1)).await.unwrap();

    h.orchestrator.environments.delete(&env.environment_id).await.unwrap();
    tasks.delete(&task.task_id).await.unwrap();

    assert!(tasks.list().await.unwrap().is_empty());
    let err = tasks.read(&task.task_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TaskNotFound(_)));
}

#[tokio::test]
async fn task_delete_tolerates_a_missing_cluster() {
    let h = harness();
    let env = environment(&h).await;
    let d = deploy(&h, "migrate").await;
    let task = h
        .orchestrator
        .tasks
        .create(task_request(&env, &d, "once", 1))
        .await
        .unwrap();

    h.cloud
        .fail_next(
            "stop_task",
            strata_provider::ProviderError::new(
                strata_provider::codes::CLUSTER_NOT_FOUND,
                "Cluster not found.",
            ),
        )
        .await;
    h.orchestrator.tasks.delete(&task.task_id).await.unwrap();
}
