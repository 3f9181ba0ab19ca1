use super::auth::AuthApi;
use super::model::{Child, Class, Credentials, Institute, Organization, Subject, User, UserRole};
use super::selection::{Selection, SelectionState};
use crate::backend::CacheBackend;
use crate::client::{CachedClient, Transport, UnauthorizedHandler};
use crate::error::{Error, Result};
use crate::key::Params;
use crate::strategy::FetchStrategy;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct SessionState {
    user: Option<User>,
    selection: Selection,
}

/// Endpoints warmed in the background once an institute is selected.
fn institute_preloads(institute_id: &str) -> [String; 3] {
    [
        format!("/institutes/{}/classes", institute_id),
        format!("/institutes/{}/subjects", institute_id),
        format!("/institutes/{}/users", institute_id),
    ]
}

fn class_preloads(institute_id: &str, class_id: &str) -> [String; 1] {
    [format!(
        "/institutes/{}/classes/{}/subjects",
        institute_id, class_id
    )]
}

/// Signed-in user plus the current institute/class/subject selection.
///
/// Clones share state. A 401 from any request made through the client clears
/// the user and selection.
pub struct SessionContext<B: CacheBackend, T: Transport> {
    client: CachedClient<B, T>,
    auth: AuthApi<B, T>,
    state: Arc<RwLock<SessionState>>,
}

impl<B: CacheBackend, T: Transport> Clone for SessionContext<B, T> {
    fn clone(&self) -> Self {
        SessionContext {
            client: self.client.clone(),
            auth: self.auth.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: CacheBackend, T: Transport> SessionContext<B, T> {
    /// Wrap `client` and register the 401 handler on its HTTP client.
    pub fn new(client: CachedClient<B, T>) -> Self {
        let state = Arc::new(RwLock::new(SessionState::default()));

        // Weak: the handler lives inside the client, which outlives contexts.
        let weak = Arc::downgrade(&state);
        let handler: UnauthorizedHandler = Arc::new(move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                let mut state = state.write().await;
                if state.user.take().is_some() {
                    info!("Session expired, user signed out");
                }
                state.selection.clear();
            });
        });
        client.http().set_unauthorized_handler(Some(handler));

        SessionContext {
            auth: AuthApi::new(client.clone()),
            client,
            state,
        }
    }

    pub fn client(&self) -> &CachedClient<B, T> {
        &self.client
    }

    pub fn auth(&self) -> &AuthApi<B, T> {
        &self.auth
    }

    // ------------------------------------------------------------------
    // Auth flows
    // ------------------------------------------------------------------

    /// Sign in and load the user's institutes. Starts with no selection.
    ///
    /// A failure to load institutes does not fail the login; the user starts
    /// with an empty institute list and can retry via
    /// [`refresh_user_data`](Self::refresh_user_data).
    ///
    /// # Errors
    ///
    /// Errors of the login request itself.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let response = self.auth.login(credentials).await?;
        if let Some(token) = response.access_token {
            self.client.http().set_token(Some(token));
        }

        let institutes = self.load_institutes(&response.user.id).await;
        let user = User::from_auth(response.user, institutes);

        let mut state = self.state.write().await;
        state.user = Some(user.clone());
        state.selection.clear();
        info!("User {} signed in ({} institutes)", user.id, user.institutes.len());

        Ok(user)
    }

    /// Re-establish the session from existing credentials (cookie or token).
    ///
    /// Returns `None` and tears everything down if the server no longer
    /// recognizes the session.
    ///
    /// # Errors
    ///
    /// None currently; the `Result` leaves room for non-auth failures.
    pub async fn restore_session(&self) -> Result<Option<User>> {
        let auth_user = match self.auth.me().await {
            Ok(user) => user,
            Err(e) => {
                info!("No session to restore: {}", e);
                self.clear_local().await;
                return Ok(None);
            }
        };

        let institutes = self.load_institutes(&auth_user.id).await;
        let user = User::from_auth(auth_user, institutes);

        let mut state = self.state.write().await;
        retain_selection(&mut state.selection, &user);
        state.user = Some(user.clone());
        info!("Session restored for user {}", user.id);

        Ok(Some(user))
    }

    /// Re-fetch the user's institutes, from the network when `force`.
    ///
    /// The selection survives if the selected institute is still listed.
    ///
    /// # Errors
    ///
    /// `Error::NotAuthenticated` with no user, otherwise request errors.
    pub async fn refresh_user_data(&self, force: bool) -> Result<User> {
        let Some(current) = self.user().await else {
            return Err(Error::NotAuthenticated);
        };

        self.client.clear_pending_requests();
        let strategy = if force {
            FetchStrategy::Refresh
        } else {
            FetchStrategy::CacheFirst
        };
        let institutes = self.auth.user_institutes(&current.id, strategy).await?;
        let user = User {
            institutes,
            ..current
        };

        let mut state = self.state.write().await;
        retain_selection(&mut state.selection, &user);
        state.user = Some(user.clone());
        debug!("Refreshed user data for {} (force: {})", user.id, force);

        Ok(user)
    }

    /// Sign out. The server call is best effort; local state is always cleared.
    pub async fn logout(&self) {
        if let Err(e) = self.auth.logout().await {
            warn!("Logout request failed, clearing local session anyway: {}", e);
        }
        self.clear_local().await;
        info!("User signed out");
    }

    async fn load_institutes(&self, user_id: &str) -> Vec<Institute> {
        match self
            .auth
            .user_institutes(user_id, FetchStrategy::CacheFirst)
            .await
        {
            Ok(institutes) => institutes,
            Err(e) => {
                warn!("Failed to load institutes for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    async fn clear_local(&self) {
        self.client.http().set_token(None);
        {
            let mut state = self.state.write().await;
            state.user = None;
            state.selection.clear();
        }
        self.client.clear_cache().await;
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Select an institute and warm its class, subject and user lists.
    ///
    /// `None` resets the whole selection and drops every cached response.
    pub async fn select_institute(&self, institute: Option<Institute>) {
        let Some(institute) = institute else {
            self.state.write().await.selection.select_institute(None);
            self.client.clear_cache().await;
            info!("Institute cleared");
            return;
        };

        let id = institute.id.clone();
        self.state
            .write()
            .await
            .selection
            .select_institute(Some(institute));
        info!("Selected institute {}", id);

        for endpoint in institute_preloads(&id) {
            self.client.spawn_preload(endpoint, Params::new());
        }
    }

    /// # Errors
    ///
    /// `Error::InvalidSelection` when no institute is selected.
    pub async fn select_class(&self, class: Option<Class>) -> Result<()> {
        let class_id = class.as_ref().map(|c| c.id.clone());
        let institute_id = {
            let mut state = self.state.write().await;
            state.selection.select_class(class)?;
            state.selection.institute().map(|i| i.id.clone())
        };

        if let (Some(iid), Some(cid)) = (institute_id, class_id) {
            info!("Selected class {} in institute {}", cid, iid);
            for endpoint in class_preloads(&iid, &cid) {
                self.client.spawn_preload(endpoint, Params::new());
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `Error::InvalidSelection` when no class is selected.
    pub async fn select_subject(&self, subject: Option<Subject>) -> Result<()> {
        self.state.write().await.selection.select_subject(subject)
    }

    pub async fn select_child(&self, child: Option<Child>) {
        self.state.write().await.selection.select_child(child);
    }

    pub async fn select_organization(&self, organization: Option<Organization>) {
        self.state
            .write()
            .await
            .selection
            .select_organization(organization);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.user.is_some()
    }

    pub async fn selection(&self) -> Selection {
        self.state.read().await.selection.clone()
    }

    pub async fn selection_state(&self) -> SelectionState {
        self.state.read().await.selection.state()
    }

    pub async fn current_institute_id(&self) -> Option<String> {
        self.state.read().await.selection.institute().map(|i| i.id.clone())
    }

    pub async fn current_class_id(&self) -> Option<String> {
        self.state.read().await.selection.class().map(|c| c.id.clone())
    }

    pub async fn current_subject_id(&self) -> Option<String> {
        self.state.read().await.selection.subject().map(|s| s.id.clone())
    }

    pub async fn current_child_id(&self) -> Option<String> {
        self.state.read().await.selection.child().map(|c| c.id.clone())
    }

    pub async fn current_organization_id(&self) -> Option<String> {
        self.state
            .read()
            .await
            .selection
            .organization()
            .map(|o| o.id.clone())
    }

    /// Role within the selected institute if the membership carries one,
    /// otherwise the user's global role.
    pub async fn effective_role(&self) -> Option<UserRole> {
        let state = self.state.read().await;
        let user = state.user.as_ref()?;
        let institute_role = state
            .selection
            .institute()
            .and_then(|selected| user.institute(&selected.id))
            .and_then(|membership| membership.user_role);
        Some(institute_role.unwrap_or(user.role))
    }
}

/// Drop the selection if its institute is no longer among the user's.
fn retain_selection(selection: &mut Selection, user: &User) {
    let gone = selection
        .institute()
        .is_some_and(|selected| user.institute(&selected.id).is_none());
    if gone {
        debug!("Selected institute no longer available, clearing selection");
        selection.select_institute(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preload_endpoints() {
        assert_eq!(
            institute_preloads("I1"),
            [
                "/institutes/I1/classes".to_string(),
                "/institutes/I1/subjects".to_string(),
                "/institutes/I1/users".to_string(),
            ]
        );
        assert_eq!(
            class_preloads("I1", "C1"),
            ["/institutes/I1/classes/C1/subjects".to_string()]
        );
    }

    #[test]
    fn test_retain_selection_drops_missing_institute() {
        let institute = Institute {
            id: "I1".to_string(),
            name: "North".to_string(),
            code: None,
            user_role: None,
            image_url: None,
        };
        let mut selection = Selection::new();
        selection.select_institute(Some(institute.clone()));

        let mut user = User {
            id: "U1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.edu".to_string(),
            role: UserRole::Teacher,
            institutes: vec![institute],
        };
        retain_selection(&mut selection, &user);
        assert_eq!(selection.state(), SelectionState::InstituteOnly);

        user.institutes.clear();
        retain_selection(&mut selection, &user);
        assert_eq!(selection.state(), SelectionState::NoInstitute);
    }
}
