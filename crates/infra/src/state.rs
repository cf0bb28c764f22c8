use std::sync::Arc;

use neighbourly_domain::contacts::ContactService;
use neighbourly_domain::endorsements::EndorsementService;
use neighbourly_domain::membership::MembershipService;
use neighbourly_domain::ports::notifications::NotificationPort;
use neighbourly_domain::ports::tx::UnitOfWork;
use neighbourly_domain::users::UserService;

use crate::config::AppConfig;
use crate::notify::LoggingNotifier;
use crate::store::InMemoryStore;

/// Fully wired service layer. Everything shares one store and one notifier.
#[derive(Clone)]
pub struct AppServices {
    pub users: UserService,
    pub contacts: ContactService,
    pub endorsements: EndorsementService,
    pub memberships: MembershipService,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(LoggingNotifier::new());
        Self::with_backend(config, store, notifier)
    }

    pub fn with_backend(
        config: &AppConfig,
        store: Arc<InMemoryStore>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        let uow: Arc<dyn UnitOfWork> = store;
        Self {
            users: UserService::new(uow.clone()),
            contacts: ContactService::new(uow.clone()),
            endorsements: EndorsementService::new(
                uow.clone(),
                notifier,
                config.rating_weights(),
            ),
            memberships: MembershipService::new(uow),
        }
    }
}
