//! In-memory directory used by the aggregator tests
//!
//! `FakeDirectory` serves fixed records per user and can be told to fail,
//! slow down or hold back individual facets.

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use crate::aggregator::Facet;
    use crate::core::DirectoryClient;
    use crate::error::{Result, ServiceError};
    use crate::models::{BasicUserInfo, FileMetadata, MembershipGroup, Thumbnail, User};

    /// Everything the directory knows about one user
    #[derive(Debug, Clone)]
    pub(crate) struct Fixture {
        pub user: User,
        pub photo: Option<Thumbnail>,
        pub manager: Option<BasicUserInfo>,
        pub direct_reports: Vec<BasicUserInfo>,
        pub groups: Vec<MembershipGroup>,
        pub files: Vec<FileMetadata>,
    }

    pub(crate) fn person(id: &str, name: &str) -> BasicUserInfo {
        BasicUserInfo {
            id: id.to_string(),
            display_name: name.to_string(),
            job_title: None,
            mail: Some(format!("{}@contoso.com", name.to_lowercase())),
        }
    }

    /// Alice: no photo, a manager, two reports, one group, one file
    pub(crate) fn alice() -> Fixture {
        Fixture {
            user: User {
                id: "u-alice".to_string(),
                display_name: "Alice".to_string(),
                job_title: Some("Engineer".to_string()),
                department: Some("Identity".to_string()),
                mail: Some("alice@contoso.com".to_string()),
                hire_date: Some("2019-03-04T00:00:00Z".to_string()),
                tags: vec!["rust".to_string(), "directory".to_string()],
            },
            photo: None,
            manager: Some(person("u-bob", "Bob")),
            direct_reports: vec![person("u-carol", "Carol"), person("u-dan", "Dan")],
            groups: vec![MembershipGroup {
                id: "g-1".to_string(),
                display_name: "Identity Team".to_string(),
                description: None,
                mail: None,
            }],
            files: vec![FileMetadata {
                id: "f-1".to_string(),
                name: "roadmap.docx".to_string(),
                web_url: None,
                size: Some(2048),
                last_modified: None,
                last_modified_by: Some("Alice".to_string()),
            }],
        }
    }

    pub(crate) fn bob() -> Fixture {
        Fixture {
            user: User {
                id: "u-bob".to_string(),
                display_name: "Bob".to_string(),
                job_title: Some("Manager".to_string()),
                department: None,
                mail: Some("bob@contoso.com".to_string()),
                hire_date: None,
                tags: Vec::new(),
            },
            photo: Some(Thumbnail::new(vec![0xff, 0xd8, 0xff]).with_content_type("image/jpeg")),
            manager: None,
            direct_reports: vec![person("u-alice", "Alice")],
            groups: Vec::new(),
            files: Vec::new(),
        }
    }

    enum Failure {
        /// Fails every call with a non-retryable error
        Always,
        /// Fails the next `n` calls with a retryable error
        Transient(usize),
    }

    #[derive(Default)]
    pub(crate) struct FakeDirectory {
        fixtures: HashMap<String, Fixture>,
        failures: Mutex<HashMap<Facet, Failure>>,
        delays: HashMap<Facet, Duration>,
        gate: Mutex<Option<watch::Receiver<bool>>>,
        calls: Mutex<Vec<(Facet, String)>>,
    }

    impl FakeDirectory {
        pub(crate) fn new() -> Self {
            Self::default().with_fixture(alice()).with_fixture(bob())
        }

        pub(crate) fn with_fixture(mut self, fixture: Fixture) -> Self {
            self.fixtures.insert(fixture.user.id.clone(), fixture);
            self
        }

        pub(crate) fn failing(self, facet: Facet) -> Self {
            self.lock_failures().insert(facet, Failure::Always);
            self
        }

        pub(crate) fn failing_times(self, facet: Facet, times: usize) -> Self {
            self.lock_failures().insert(facet, Failure::Transient(times));
            self
        }

        pub(crate) fn with_delay(mut self, facet: Facet, delay: Duration) -> Self {
            self.delays.insert(facet, delay);
            self
        }

        /// Calls starting from now wait until the returned sender sends `true`
        pub(crate) fn close_gate(&self) -> watch::Sender<bool> {
            let (tx, rx) = watch::channel(false);
            *self.gate.lock().unwrap() = Some(rx);
            tx
        }

        /// Calls starting from now proceed immediately
        pub(crate) fn open_gate(&self) {
            *self.gate.lock().unwrap() = None;
        }

        pub(crate) fn calls(&self) -> Vec<(Facet, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn calls_for(&self, facet: Facet) -> usize {
            self.calls().iter().filter(|(f, _)| *f == facet).count()
        }

        /// Wait until at least `count` calls have started
        pub(crate) async fn wait_for_calls(&self, count: usize) {
            while self.calls.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }

        fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<Facet, Failure>> {
            self.failures.lock().unwrap()
        }

        /// Shared prologue of every fetch: log, hold at the gate, delay,
        /// then decide whether to fail
        async fn enter(&self, facet: Facet, user_id: &str) -> Result<&Fixture> {
            self.calls.lock().unwrap().push((facet, user_id.to_string()));
            let gate = self.gate.lock().unwrap().clone();

            if let Some(mut gate) = gate {
                let _ = gate.wait_for(|open| *open).await;
            }

            if let Some(delay) = self.delays.get(&facet) {
                tokio::time::sleep(*delay).await;
            }

            {
                let mut failures = self.lock_failures();
                match failures.get_mut(&facet) {
                    Some(Failure::Always) => {
                        return Err(ServiceError::service(format!("{} backend unavailable", facet)));
                    }
                    Some(Failure::Transient(remaining)) if *remaining > 0 => {
                        *remaining -= 1;
                        return Err(ServiceError::network(format!("{} connection reset", facet)));
                    }
                    _ => {}
                }
            }

            self.fixtures
                .get(user_id)
                .ok_or_else(|| ServiceError::not_found(format!("user {} not found", user_id)))
        }
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn get_user(&self, user_id: &str) -> Result<User> {
            Ok(self.enter(Facet::User, user_id).await?.user.clone())
        }

        async fn get_photo(&self, user_id: &str) -> Result<Option<Thumbnail>> {
            Ok(self.enter(Facet::Photo, user_id).await?.photo.clone())
        }

        async fn get_manager(&self, user_id: &str) -> Result<Option<BasicUserInfo>> {
            Ok(self.enter(Facet::Manager, user_id).await?.manager.clone())
        }

        async fn get_direct_reports(&self, user_id: &str) -> Result<Vec<BasicUserInfo>> {
            Ok(self.enter(Facet::DirectReports, user_id).await?.direct_reports.clone())
        }

        async fn get_group_memberships(&self, user_id: &str) -> Result<Vec<MembershipGroup>> {
            Ok(self.enter(Facet::MembershipGroups, user_id).await?.groups.clone())
        }

        async fn get_files(&self, user_id: &str) -> Result<Vec<FileMetadata>> {
            Ok(self.enter(Facet::Files, user_id).await?.files.clone())
        }
    }
}
