//! End-to-end assignment flow through the library API: registration,
//! login, project setup, claiming, and completion.

use std::sync::Arc;

use taskhub_proto::eligibility;
use taskhub_proto::entity::EntityType;
use taskhub_proto::project::default_stages;
use taskhub_proto::skill::SkillSet;
use taskhub_proto::task::TaskStatus;

use taskhub_server::auth::{self, Authenticator};
use taskhub_server::ledger::{AssignmentLedger, TaskPatch};
use taskhub_server::store::{NewEntity, NewTask, Store};

async fn register_agent(store: &Store, name: &str, skills: &str) -> (taskhub_proto::entity::Entity, String) {
    let api_key = auth::mint_api_key();
    let entity = store
        .create_entity(NewEntity {
            name: name.to_string(),
            entity_type: EntityType::Agent,
            email: None,
            api_key: Some(api_key.clone()),
            password_hash: None,
            skills: SkillSet::parse_text(skills),
        })
        .await
        .unwrap();
    (entity, api_key)
}

#[tokio::test]
async fn claim_work_and_complete_it() {
    let store = Arc::new(Store::new());
    let ledger = AssignmentLedger::new(Arc::clone(&store));

    // A human sets up the board.
    let human = store
        .create_entity(NewEntity {
            name: "alice".to_string(),
            entity_type: EntityType::Human,
            email: Some("alice@example.com".to_string()),
            api_key: None,
            password_hash: Some(auth::hash_password("secret")),
            skills: SkillSet::new(),
        })
        .await
        .unwrap();
    let project = store
        .create_project("website".to_string(), None, human.id)
        .await;
    for (name, description, order) in default_stages() {
        store
            .create_stage(project.id, name.to_string(), Some(description.to_string()), order)
            .await
            .unwrap();
    }
    assert_eq!(store.list_stages(project.id).await.len(), 5);

    let (task, _) = ledger
        .create_task(NewTask {
            title: "write deploy script".to_string(),
            description: None,
            project_id: project.id,
            stage_id: None,
            parent_task_id: None,
            required_skills: SkillSet::parse_text("python, devops"),
            priority: 3,
        })
        .await
        .unwrap();

    // An agent with overlapping skills sees and claims the task.
    let (agent, _key) = register_agent(&store, "deploy-bot", "python, testing").await;
    let claimable = store.claimable_tasks().await;
    let available = eligibility::available_tasks(&agent, claimable);
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, task.id);

    let (claimed, _) = ledger.self_assign(task.id, agent.id).await.unwrap();
    assert_eq!(claimed.assignees, vec![agent.id]);

    // Claiming twice changes nothing.
    let (claimed_again, _) = ledger.self_assign(task.id, agent.id).await.unwrap();
    assert_eq!(claimed_again.assignees, vec![agent.id]);

    // The agent finishes the work.
    let (done, _) = ledger
        .apply_update(
            task.id,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.completed_at.is_some());

    // Completed tasks are no longer claimable.
    assert!(store.claimable_tasks().await.is_empty());
}

#[tokio::test]
async fn skills_gate_availability_but_not_assignment() {
    let store = Arc::new(Store::new());
    let ledger = AssignmentLedger::new(Arc::clone(&store));

    let (creator, _) = register_agent(&store, "planner", "").await;
    let project = store
        .create_project("ml-pipeline".to_string(), None, creator.id)
        .await;
    let (task, _) = ledger
        .create_task(NewTask {
            title: "train model".to_string(),
            description: None,
            project_id: project.id,
            stage_id: None,
            parent_task_id: None,
            required_skills: SkillSet::parse_text("ml"),
            priority: 0,
        })
        .await
        .unwrap();

    let (unskilled, _) = register_agent(&store, "web-bot", "javascript").await;
    let available = eligibility::available_tasks(&unskilled, store.claimable_tasks().await);
    assert!(available.is_empty());

    // Explicit assignment ignores the advisory skill gate.
    let (assigned, _) = ledger.assign(task.id, unskilled.id).await.unwrap();
    assert_eq!(assigned.assignees, vec![unskilled.id]);

    let (unassigned, _) = ledger.unassign(task.id, unskilled.id).await.unwrap();
    assert!(unassigned.assignees.is_empty());
}

#[tokio::test]
async fn login_and_credential_resolution() {
    let store = Store::new();
    let authenticator = Authenticator::new();

    let human = store
        .create_entity(NewEntity {
            name: "bob".to_string(),
            entity_type: EntityType::Human,
            email: Some("bob@example.com".to_string()),
            api_key: None,
            password_hash: Some(auth::hash_password("hunter2")),
            skills: SkillSet::new(),
        })
        .await
        .unwrap();

    let token = authenticator
        .login(&store, "bob@example.com", "hunter2")
        .await
        .unwrap();
    let resolved = authenticator.entity_for_token(&store, &token).await.unwrap();
    assert_eq!(resolved.id, human.id);

    let (agent, key) = register_agent(&store, "bot", "rust").await;
    let resolved = authenticator.entity_for_api_key(&store, &key).await.unwrap();
    assert_eq!(resolved.id, agent.id);

    assert!(authenticator.entity_for_token(&store, "bogus").await.is_err());
}

#[tokio::test]
async fn duplicate_email_registration_fails() {
    let store = Store::new();
    let entity = NewEntity {
        name: "carol".to_string(),
        entity_type: EntityType::Human,
        email: Some("carol@example.com".to_string()),
        api_key: None,
        password_hash: Some(auth::hash_password("pw")),
        skills: SkillSet::new(),
    };
    store.create_entity(entity.clone()).await.unwrap();
    assert!(store.create_entity(entity).await.is_err());
}

#[tokio::test]
async fn subtask_lifecycle_with_cycle_rejection() {
    let store = Arc::new(Store::new());
    let ledger = AssignmentLedger::new(Arc::clone(&store));

    let (creator, _) = register_agent(&store, "planner", "").await;
    let project = store
        .create_project("refactor".to_string(), None, creator.id)
        .await;

    let (epic, _) = ledger
        .create_task(NewTask {
            title: "epic".to_string(),
            description: None,
            project_id: project.id,
            stage_id: None,
            parent_task_id: None,
            required_skills: SkillSet::new(),
            priority: 5,
        })
        .await
        .unwrap();
    let (step, _) = ledger
        .create_task(NewTask {
            title: "step".to_string(),
            description: None,
            project_id: project.id,
            stage_id: None,
            parent_task_id: Some(epic.id),
            required_skills: SkillSet::new(),
            priority: 1,
        })
        .await
        .unwrap();

    let children = store.subtasks(epic.id).await;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, step.id);

    // Making the epic a child of its own step must be rejected.
    let result = ledger
        .apply_update(
            epic.id,
            TaskPatch {
                parent_task_id: Some(step.id),
                ..TaskPatch::default()
            },
        )
        .await;
    assert!(result.is_err());

    // Deleting the epic detaches the step instead of orphaning it.
    ledger.delete_task(epic.id).await.unwrap();
    let step = store.get_task(step.id).await.unwrap();
    assert_eq!(step.parent_task_id, None);
}
