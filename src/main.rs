use savings_buddy::{
    config::{self, seed::SeedConfig},
    core::{aggregate, resource::ResourceKind, session::AuthSession},
    errors::Result,
    remote::{IdentityProvider, InviteResolver, RemoteCollectionClient},
    store::{DocumentBackend, LocalIdentityProvider, ProfileInviteResolver, StoreClient},
};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Who we sign in as, and which goals to start with
    let principal = config::principal::principal_from_env()
        .inspect_err(|e| error!("Failed to load principal configuration: {}", e))?;
    let seeds = config::seed::load_default_config().unwrap_or_else(|e| {
        warn!("No starter goals loaded: {}", e);
        SeedConfig::default()
    });

    // 4. Initialize database
    let db = config::database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    config::database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    // 5. Wire the store and the session
    let backend = DocumentBackend::new(db);
    let identity = Arc::new(LocalIdentityProvider::new());
    let client = Arc::new(StoreClient::new(backend.clone(), Arc::clone(&identity)));
    let resolver = Arc::new(ProfileInviteResolver::new(backend, Arc::clone(&identity)));
    let session = AuthSession::new(Arc::clone(&identity), client, resolver);

    // 6. Sign in and apply the auth changes delivered so far
    let (registration, mut changes) = session.listen();
    identity.sign_in(principal);
    while let Ok(state) = changes.try_recv() {
        session.handle(state).await?;
    }

    // 7. Seed starter goals, then report
    for kind in [ResourceKind::Bucket, ResourceKind::Trip] {
        let goals = match kind {
            ResourceKind::Bucket => &seeds.buckets,
            ResourceKind::Trip => &seeds.trips,
        };
        config::seed::seed_initial_resources(session.engine(kind), goals).await?;
    }
    session.refresh_members().await?;
    log_report(&session);

    // 8. Sign out; the session loop ends once the registration is gone
    identity.sign_out();
    drop(registration);
    session.run(changes).await;
    info!("Signed out.");

    Ok(())
}

fn log_report<C, R, I>(session: &AuthSession<C, R, I>)
where
    C: RemoteCollectionClient,
    R: InviteResolver,
    I: IdentityProvider,
{
    for kind in [ResourceKind::Bucket, ResourceKind::Trip] {
        let view = session.engine(kind).snapshot();
        let totals = aggregate::rollup(&view.items);
        info!(
            "{} {}s: saved {} of {} ({} to go), {} with a goal {}",
            view.items.len(),
            kind,
            aggregate::format_amount(totals.total_saved),
            aggregate::format_amount(totals.total_goal),
            aggregate::format_amount(totals.remaining),
            totals.active_goal_count,
            aggregate::format_progress_bar(totals.overall_progress, None),
        );

        for resource in aggregate::top_n(&view.items, 3) {
            let members: Vec<String> = resource
                .member_ids
                .iter()
                .map(|id| session.profiles().display(id).display_name)
                .collect();
            info!(
                "  {}: {} {} [{}]",
                resource.name,
                aggregate::format_amount(aggregate::display_balance(&resource)),
                aggregate::progress_label(&resource),
                members.join(", "),
            );
        }
    }
}
