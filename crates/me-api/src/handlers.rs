//! # me-api Handlers
//!
//! Each handler runs the session guard for its route first, then hands
//! the work to the core components held in [`AppState`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use me_core::session::{HOME_PATH, LOGIN_PATH};
use me_core::tasks::{BoardColumns, TaskBoard};
use me_core::timer::FocusTimerHandle;
use me_core::validation::{LoginForm, RegistrationForm};
use me_core::{
    Access, AppError, AuthProvider, CredentialGateway, FocusTimer, PreferenceStore, Route, SessionGuard,
    SettingsPatch, Step, StepPatch, Task, TaskPatch, TaskStatus, TaskStore, TimerState, TableClient,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::ApiError;

pub const BREAK_MESSAGE: &str = "You have been focused for a while. How about a break?";

type Reply = Result<HttpResponse, ApiError>;

/// State shared across all Actix-web workers.
///
/// One guard, one board and one timer: the server acts for a single
/// signed-in user at a time.
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub guard: Arc<SessionGuard>,
    pub gateway: CredentialGateway,
    pub settings: PreferenceStore,
    pub tasks: TaskStore,
    pub board: Mutex<TaskBoard>,
    pub timer: FocusTimerHandle,
    pub break_alert: Arc<AtomicBool>,
}

impl AppState {
    /// The session guard starts out loading; resolve it with
    /// `state.guard.resolve(state.auth.as_ref())`.
    pub fn new(auth: Arc<dyn AuthProvider>, db: Arc<dyn TableClient>) -> Self {
        let guard = Arc::new(SessionGuard::new());
        let break_alert = Arc::new(AtomicBool::new(false));
        let raised = Arc::clone(&break_alert);

        Self {
            gateway: CredentialGateway::new(Arc::clone(&auth), Arc::clone(&guard)),
            settings: PreferenceStore::new(Arc::clone(&db), Arc::clone(&auth)),
            tasks: TaskStore::new(db),
            board: Mutex::new(TaskBoard::default()),
            timer: FocusTimerHandle::new(Arc::new(move || raised.store(true, Ordering::SeqCst))),
            break_alert,
            guard,
            auth,
        }
    }

    /// Applies the route's policy to the current session. `None` means the
    /// handler may proceed.
    async fn admit(&self, route: Route) -> Option<HttpResponse> {
        let policy = route.policy()?;
        match policy.decide(self.guard.refreshed_snapshot(self.auth.as_ref()).await) {
            Access::Allow => None,
            Access::Loading => Some(HttpResponse::Accepted().json(json!({ "status": "loading" }))),
            Access::Redirect(location) => Some(see_other(location)),
        }
    }
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther().insert_header(("Location", location)).finish()
}

macro_rules! guarded {
    ($state:expr, $route:expr) => {
        if let Some(response) = $state.admit($route).await {
            return Ok(response);
        }
    };
}

// --- Views ---

#[derive(Serialize)]
pub struct TimerView {
    #[serde(flatten)]
    pub state: TimerState,
    pub display: String,
    pub progress: f64,
}

impl From<FocusTimer> for TimerView {
    fn from(timer: FocusTimer) -> Self {
        Self { state: timer.state(), display: timer.display(), progress: timer.progress() }
    }
}

#[derive(Serialize)]
struct TasksView {
    columns: BoardColumns,
    timer: TimerView,
    break_alert: Option<&'static str>,
}

#[derive(Serialize)]
struct TaskView<'a> {
    #[serde(flatten)]
    task: &'a Task,
    completed_steps: usize,
    total_steps: usize,
    percent: u8,
}

impl<'a> TaskView<'a> {
    fn new(task: &'a Task) -> Self {
        let progress = task.progress();
        Self { task, completed_steps: progress.completed, total_steps: progress.total, percent: progress.percent() }
    }
}

fn current_timer(state: &AppState) -> TimerView {
    TimerView::from(state.timer.snapshot())
}

// --- Auth ---

pub async fn login_page(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Login);
    Ok(HttpResponse::Ok().json(json!({ "page": "login", "fields": ["email", "password"] })))
}

pub async fn register_page(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Register);
    Ok(HttpResponse::Ok().json(json!({
        "page": "register",
        "fields": ["name", "email", "password", "confirm_password"],
    })))
}

pub async fn login(data: web::Data<AppState>, form: web::Form<LoginForm>) -> Reply {
    guarded!(data, Route::Login);
    data.gateway.login(&form).await?;
    Ok(see_other(HOME_PATH))
}

pub async fn register(data: web::Data<AppState>, form: web::Form<RegistrationForm>) -> Reply {
    guarded!(data, Route::Register);
    data.gateway.register(&form).await?;
    Ok(see_other(HOME_PATH))
}

/// Signs out and drops everything the previous user had on screen.
pub async fn logout(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Logout);
    data.gateway.sign_out().await?;
    data.board.lock().await.replace(Vec::new());
    data.timer.reset();
    data.break_alert.store(false, Ordering::SeqCst);
    Ok(see_other(LOGIN_PATH))
}

// --- Dashboard & preferences ---

pub async fn dashboard(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Dashboard);
    let settings = data.settings.get_user_settings().await?;
    let user = data.guard.user();

    let mode = if settings.focus_mode { "Focus mode on" } else { "Normal mode" };
    Ok(HttpResponse::Ok().json(json!({
        "user": user.map(|u| json!({ "id": u.id, "email": u.email, "name": u.user_metadata.name })),
        "complexity_level": settings.complexity_level,
        "focus_mode": settings.focus_mode,
        "summary_mode": settings.summary_mode,
        "font_size": settings.font_size,
        "spacing": settings.spacing,
        "contrast": settings.contrast,
        "status": format!("{mode} · Complexity {}", settings.complexity_level.label()),
    })))
}

pub async fn profile(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Profile);
    let settings = data.settings.get_user_settings().await?;
    let preferences: Vec<_> = settings
        .preference_summary()
        .into_iter()
        .map(|(label, value)| json!({ "label": label, "value": value }))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "user": data.guard.user(),
        "preferences": preferences,
    })))
}

pub async fn get_settings(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Settings);
    let settings = data.settings.get_user_settings().await?;
    Ok(HttpResponse::Ok().json(settings))
}

pub async fn update_settings(data: web::Data<AppState>, patch: web::Json<SettingsPatch>) -> Reply {
    guarded!(data, Route::Settings);
    let settings = data.settings.update_user_settings(&patch).await?;
    Ok(HttpResponse::Ok().json(settings))
}

// --- Task board ---

/// Reloads the board from the backend, like opening the page.
pub async fn tasks_page(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Tasks);
    let tasks = data.tasks.load_board().await?;

    let mut board = data.board.lock().await;
    board.replace(tasks);
    let alert = data.break_alert.load(Ordering::SeqCst).then_some(BREAK_MESSAGE);

    Ok(HttpResponse::Ok().json(TasksView { columns: board.columns(), timer: current_timer(&data), break_alert: alert }))
}

#[derive(Debug, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_task(data: web::Data<AppState>, body: web::Json<NewTask>) -> Reply {
    guarded!(data, Route::Tasks);
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::validation("task title is required").into());
    }
    let description = body.description.as_deref().map(str::trim).filter(|d| !d.is_empty());

    let record = data.tasks.create_task(title, description).await?;
    let task = Task::from_record(record, Vec::new());
    let response = HttpResponse::Created().json(TaskView::new(&task));
    data.board.lock().await.insert(task);
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: TaskStatus,
}

/// The board moves the card first; a failed save is reported and the card
/// stays where it was moved.
pub async fn change_status(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StatusChange>,
) -> Reply {
    guarded!(data, Route::Tasks);
    let task_id = path.into_inner();

    let previous = data
        .board
        .lock()
        .await
        .change_status(&task_id, body.status)
        .ok_or_else(|| AppError::NotFound("task".into()))?;
    log::debug!("task {task_id}: {} -> {}", previous.as_str(), body.status.as_str());

    let record = data.tasks.update_task(&task_id, &TaskPatch::status(body.status)).await?;
    Ok(HttpResponse::Ok().json(record))
}

pub async fn delete_task(data: web::Data<AppState>, path: web::Path<String>) -> Reply {
    guarded!(data, Route::Tasks);
    let task_id = path.into_inner();
    data.tasks.delete_task(&task_id).await?;
    data.board.lock().await.remove(&task_id);
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize)]
pub struct NewStep {
    pub text: String,
}

pub async fn create_step(data: web::Data<AppState>, path: web::Path<String>, body: web::Json<NewStep>) -> Reply {
    guarded!(data, Route::Tasks);
    let task_id = path.into_inner();
    let text = body.text.trim();
    if text.is_empty() {
        return Err(AppError::validation("step text is required").into());
    }

    let step = Step::from(data.tasks.create_step(&task_id, text).await?);
    if !data.board.lock().await.push_step(&task_id, step.clone()) {
        log::debug!("step {} added to task {task_id}, which is not on the board", step.id);
    }
    Ok(HttpResponse::Created().json(step))
}

/// Same local-then-persist order as [`change_status`].
pub async fn toggle_step(data: web::Data<AppState>, path: web::Path<(String, String)>) -> Reply {
    guarded!(data, Route::Tasks);
    let (task_id, step_id) = path.into_inner();

    let completed = data
        .board
        .lock()
        .await
        .toggle_step(&task_id, &step_id)
        .ok_or_else(|| AppError::NotFound("step".into()))?;

    let record = data.tasks.update_step(&step_id, &StepPatch::completed(completed)).await?;
    Ok(HttpResponse::Ok().json(Step::from(record)))
}

pub async fn delete_step(data: web::Data<AppState>, path: web::Path<(String, String)>) -> Reply {
    guarded!(data, Route::Tasks);
    let (task_id, step_id) = path.into_inner();
    data.tasks.delete_step(&step_id).await?;
    data.board.lock().await.remove_step(&task_id, &step_id);
    Ok(HttpResponse::NoContent().finish())
}

// --- Focus timer ---

pub async fn timer_state(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Tasks);
    Ok(HttpResponse::Ok().json(current_timer(&data)))
}

pub async fn timer_action(data: web::Data<AppState>, path: web::Path<String>) -> Reply {
    guarded!(data, Route::Tasks);
    match path.as_str() {
        "start" => data.timer.start(),
        "pause" => data.timer.pause(),
        "reset" => data.timer.reset(),
        "toggle" => data.timer.toggle_mode(),
        _ => return Err(AppError::NotFound("timer action".into()).into()),
    };
    Ok(HttpResponse::Ok().json(current_timer(&data)))
}

pub async fn dismiss_alert(data: web::Data<AppState>) -> Reply {
    guarded!(data, Route::Tasks);
    data.break_alert.store(false, Ordering::SeqCst);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "page not found" }))
}
