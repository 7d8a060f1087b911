/*
 * Responsibility
 *  - ルートごとの「門番の設定」を型として宣言する
 *  - Endpoint (resource type, action, visibility, class) と対象リソースの path parameter
 *
 * 置くもの
 *  - ListProjects, UpdateTask などのマーカー型
 *
 * 置かないもの
 *  - extractor 実装 (core.rs)
 *  - アクセスルール本体 (policies.rs)
 */
use super::core::GatedRoute;
use crate::policies::{AUTH_CLASS, PROJECT, SESSION, TASK};
use crate::services::authz::Action;
use crate::services::gate::Endpoint;

// session
pub enum ReadSession {}
impl GatedRoute for ReadSession {
    const ENDPOINT: Endpoint = Endpoint::protected(SESSION, Action::Read).in_class(AUTH_CLASS);
    const TARGET: &'static str = SESSION;
}

// projects
pub enum ListProjects {}
impl GatedRoute for ListProjects {
    const ENDPOINT: Endpoint = Endpoint::public(PROJECT, Action::List);
    const TARGET: &'static str = PROJECT;
}

pub enum CreateProject {}
impl GatedRoute for CreateProject {
    const ENDPOINT: Endpoint = Endpoint::protected(PROJECT, Action::Create);
    const TARGET: &'static str = PROJECT;
}

pub enum ReadProject {}
impl GatedRoute for ReadProject {
    const ENDPOINT: Endpoint = Endpoint::protected(PROJECT, Action::Read);
    const TARGET: &'static str = PROJECT;
    const ID_PARAM: Option<&'static str> = Some("project_id");
}

pub enum UpdateProject {}
impl GatedRoute for UpdateProject {
    const ENDPOINT: Endpoint = Endpoint::protected(PROJECT, Action::Update);
    const TARGET: &'static str = PROJECT;
    const ID_PARAM: Option<&'static str> = Some("project_id");
}

pub enum DeleteProject {}
impl GatedRoute for DeleteProject {
    const ENDPOINT: Endpoint = Endpoint::protected(PROJECT, Action::Delete);
    const TARGET: &'static str = PROJECT;
    const ID_PARAM: Option<&'static str> = Some("project_id");
}

// tasks (list/create are addressed through their project)
pub enum ListProjectTasks {}
impl GatedRoute for ListProjectTasks {
    const ENDPOINT: Endpoint = Endpoint::protected(TASK, Action::List);
    const TARGET: &'static str = PROJECT;
    const ID_PARAM: Option<&'static str> = Some("project_id");
}

pub enum CreateTask {}
impl GatedRoute for CreateTask {
    const ENDPOINT: Endpoint = Endpoint::protected(TASK, Action::Create);
    const TARGET: &'static str = PROJECT;
    const ID_PARAM: Option<&'static str> = Some("project_id");
}

pub enum ReadTask {}
impl GatedRoute for ReadTask {
    const ENDPOINT: Endpoint = Endpoint::protected(TASK, Action::Read);
    const TARGET: &'static str = TASK;
    const ID_PARAM: Option<&'static str> = Some("task_id");
}

pub enum UpdateTask {}
impl GatedRoute for UpdateTask {
    const ENDPOINT: Endpoint = Endpoint::protected(TASK, Action::Update);
    const TARGET: &'static str = TASK;
    const ID_PARAM: Option<&'static str> = Some("task_id");
}

pub enum DeleteTask {}
impl GatedRoute for DeleteTask {
    const ENDPOINT: Endpoint = Endpoint::protected(TASK, Action::Delete);
    const TARGET: &'static str = TASK;
    const ID_PARAM: Option<&'static str> = Some("task_id");
}
