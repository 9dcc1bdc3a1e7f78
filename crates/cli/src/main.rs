use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use mdr_core::config::{registration_state_from_env_value, resolve_registry_file};
use mdr_core::constants::{DEFAULT_LOCKED_STATE, DEFAULT_PUBLIC_STATE};
use mdr_core::{
    Action, AuthorityId, CoreConfig, GroupOwner, ItemId, ItemType, MemorySink, Registry,
    RegistrationState, RegistryError, RegistryResult, RegistryService, RegistryStore, UserId,
    WorkgroupId, YamlFileStore,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mdr")]
#[command(about = "Metadata registry CLI")]
struct Cli {
    /// Registry snapshot file (defaults to MDR_REGISTRY_FILE, then registry.yaml)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    /// Username of the acting user
    #[arg(long = "as", global = true)]
    actor: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OwnerArg {
    Workgroup,
    Authority,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty registry snapshot
    Init,
    /// Create a user (the first user needs no --as)
    AddUser {
        username: String,
        #[arg(long)]
        superuser: bool,
    },
    /// Create a registration authority
    AddAuthority {
        name: String,
        /// State at or beyond which items are locked
        #[arg(long)]
        locked_state: Option<RegistrationState>,
        /// State at or beyond which items are public
        #[arg(long)]
        public_state: Option<RegistrationState>,
    },
    /// Create a workgroup
    AddWorkgroup {
        name: String,
        /// Registration authority the workgroup submits to (repeatable)
        #[arg(long = "authority")]
        authorities: Vec<String>,
    },
    /// Rename a workgroup
    RenameWorkgroup { old: String, new: String },
    /// Add a user to a workgroup as a Viewer
    Join { workgroup: String, username: String },
    /// Remove a user from a workgroup, revoking every role
    Leave { workgroup: String, username: String },
    /// Grant a role in a workgroup or registration authority
    Grant {
        owner: OwnerArg,
        name: String,
        role: String,
        username: String,
    },
    /// Revoke a role in a workgroup or registration authority
    Revoke {
        owner: OwnerArg,
        name: String,
        role: String,
        username: String,
    },
    /// Create an item
    AddItem {
        /// Item type, e.g. object_class, data_element, package
        kind: ItemType,
        name: String,
        #[arg(long)]
        workgroup: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Point a reference field of an item at another item or vocabulary entry
    Link {
        item: String,
        field: String,
        target: String,
    },
    /// Register an item in a registration authority
    Register {
        item: String,
        authority: String,
        state: RegistrationState,
        /// Registration date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Also register the item's dependents
        #[arg(long)]
        cascade: bool,
        #[arg(long)]
        details: Option<String>,
    },
    /// Show an item's statuses
    Status { item: String },
    /// Ask whether a user may perform an action on an item
    Can {
        action: Action,
        username: String,
        item: String,
        /// Authority to check status changes against
        #[arg(long)]
        authority: Option<String>,
    },
    /// Toggle an item in a user's favourites
    Favourite { username: String, item: String },
    /// List items visible to the acting user
    List {
        /// List public items instead
        #[arg(long)]
        public: bool,
    },
    /// List standard data set specifications and packages of an authority
    Standard { authority: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("mdr=warn".parse()?))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let registry_file = resolve_registry_file(
        cli.registry
            .clone()
            .or_else(|| std::env::var_os("MDR_REGISTRY_FILE").map(PathBuf::from)),
    );
    let cfg = CoreConfig::new(
        registry_file,
        registration_state_from_env_value(
            std::env::var("MDR_DEFAULT_LOCKED_STATE").ok(),
            DEFAULT_LOCKED_STATE,
        )?,
        registration_state_from_env_value(
            std::env::var("MDR_DEFAULT_PUBLIC_STATE").ok(),
            DEFAULT_PUBLIC_STATE,
        )?,
    )?;

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = run(cli, Arc::new(cfg), &mut stdout) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(
    cli: Cli,
    cfg: Arc<CoreConfig>,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(YamlFileStore::new(cfg.registry_file()));

    let Some(command) = cli.command else {
        writeln!(out, "No command given. Run with --help for usage.")?;
        return Ok(());
    };

    if let Commands::Init = command {
        if store.load()?.is_some() {
            writeln!(out, "Registry already exists at {}", store.path().display())?;
        } else {
            store.save(&Registry::new())?;
            writeln!(out, "Initialised registry at {}", store.path().display())?;
        }
        return Ok(());
    }

    let sink = Arc::new(MemorySink::new());
    let service = RegistryService::open(cfg, store, sink.clone())?;
    let actor = match &cli.actor {
        Some(username) => Some(find_user(&service, username)?),
        None => None,
    };
    let need_actor = || {
        actor.ok_or_else(|| {
            RegistryError::InvalidInput("this command needs --as <username>".into())
        })
    };

    match command {
        Commands::Init => {}
        Commands::AddUser {
            username,
            superuser,
        } => {
            let id = service.add_user(actor, &username, superuser)?;
            writeln!(out, "Created user {} with ID: {}", username, id)?;
        }
        Commands::AddAuthority {
            name,
            locked_state,
            public_state,
        } => {
            let id = service.add_authority(need_actor()?, &name, locked_state, public_state)?;
            writeln!(out, "Created registration authority {} with ID: {}", name, id)?;
        }
        Commands::AddWorkgroup { name, authorities } => {
            let actor = need_actor()?;
            let id = service.add_workgroup(actor, &name)?;
            for authority in authorities {
                let ra = find_authority(&service, &authority)?;
                service.link_workgroup_authority(actor, id, ra)?;
            }
            writeln!(out, "Created workgroup {} with ID: {}", name, id)?;
        }
        Commands::RenameWorkgroup { old, new } => {
            let wg = find_workgroup(&service, &old)?;
            service.rename_workgroup(need_actor()?, wg, &new)?;
            let groups = service.read(|reg| reg.group_names(wg.into()))?;
            writeln!(out, "Renamed workgroup {} to {} ({})", old, new, groups.join(", "))?;
        }
        Commands::Join {
            workgroup,
            username,
        } => {
            let wg = find_workgroup(&service, &workgroup)?;
            let user = find_user(&service, &username)?;
            service.add_user_to_workgroup(need_actor()?, wg, user)?;
            writeln!(out, "Added {} to {}", username, workgroup)?;
        }
        Commands::Leave {
            workgroup,
            username,
        } => {
            let wg = find_workgroup(&service, &workgroup)?;
            let user = find_user(&service, &username)?;
            service.remove_user_from_workgroup(need_actor()?, wg, user)?;
            writeln!(out, "Removed {} from {}", username, workgroup)?;
        }
        Commands::Grant {
            owner,
            name,
            role,
            username,
        } => {
            let owner = find_owner(&service, owner, &name)?;
            let user = find_user(&service, &username)?;
            service.give_role(need_actor()?, owner, &role, user)?;
            writeln!(out, "{} roles in {}: {}", username, name, roles(&service, owner, user)?)?;
        }
        Commands::Revoke {
            owner,
            name,
            role,
            username,
        } => {
            let owner = find_owner(&service, owner, &name)?;
            let user = find_user(&service, &username)?;
            service.remove_role(need_actor()?, owner, &role, user)?;
            writeln!(out, "{} roles in {}: {}", username, name, roles(&service, owner, user)?)?;
        }
        Commands::AddItem {
            kind,
            name,
            workgroup,
            description,
        } => {
            let wg = find_workgroup(&service, &workgroup)?;
            let id = service.create_item(need_actor()?, wg, kind, &name, &description)?;
            writeln!(out, "Created {} {} with ID: {}", kind, name, id)?;
        }
        Commands::Link {
            item,
            field,
            target,
        } => {
            let id = find_item(&service, &item)?;
            let target_id = service.read(|reg| {
                Ok(match find_item_in(reg, &target) {
                    Ok(found) => found.to_string(),
                    Err(_) => reg
                        .vocabulary_entries()
                        .find(|v| v.name.as_str() == target.trim())
                        .map(|v| v.id.to_string())
                        .unwrap_or_else(|| target.clone()),
                })
            })?;
            service.link(need_actor()?, id, &field, &target_id)?;
            writeln!(out, "Linked {}.{} to {}", item, field, target)?;
        }
        Commands::Register {
            item,
            authority,
            state,
            date,
            cascade,
            details,
        } => {
            let id = find_item(&service, &item)?;
            let ra = find_authority(&service, &authority)?;
            let status =
                service.register(need_actor()?, ra, id, state, date, cascade, details)?;
            let summary = service.read(|reg| reg.describe_status(&status))?;
            writeln!(out, "{} (registered {})", summary, status.registration_date)?;
            if cascade {
                let touched = service.read(|reg| {
                    Ok(reg
                        .statuses()
                        .for_authority(ra)
                        .filter(|s| s.item != id && s.modified >= status.modified)
                        .count())
                })?;
                writeln!(out, "Cascaded to {} dependent item(s)", touched)?;
            }
        }
        Commands::Status { item } => {
            let id = find_item(&service, &item)?;
            let statuses = service.statuses(need_actor()?, id)?;
            if statuses.is_empty() {
                writeln!(out, "{} is not registered.", item)?;
            }
            for status in statuses {
                let summary = service.read(|reg| reg.describe_status(&status))?;
                writeln!(out, "{} since {}", summary, status.registration_date)?;
            }
        }
        Commands::Can {
            action,
            username,
            item,
            authority,
        } => {
            let user = find_user(&service, &username)?;
            let id = find_item(&service, &item)?;
            let ra = match authority {
                Some(name) => Some(find_authority(&service, &name)?),
                None => None,
            };
            let decision = service.decide(user, action, id, ra)?;
            let verdict = if decision.allowed { "yes" } else { "no" };
            writeln!(out, "{} ({})", verdict, decision.grounds)?;
        }
        Commands::Favourite { username, item } => {
            let user = find_user(&service, &username)?;
            let id = find_item(&service, &item)?;
            let now = service.toggle_favourite(user, id)?;
            let verb = if now { "Added" } else { "Removed" };
            writeln!(out, "{} {} {} favourites", verb, item, if now { "to" } else { "from" })?;
        }
        Commands::List { public } => {
            let items = if public {
                service.public_items()?
            } else {
                service.visible_items(need_actor()?)?
            };
            if items.is_empty() {
                writeln!(out, "No items found.")?;
            }
            for item in items {
                writeln!(out, "ID: {}, Type: {}, Name: {}", item.id, item.item_type(), item.name)?;
            }
        }
        Commands::Standard { authority } => {
            let ra = find_authority(&service, &authority)?;
            for (label, pairs) in [
                (
                    "Data set specifications",
                    service.standard_data_set_specifications(ra)?,
                ),
                ("Packages", service.standard_packages(ra)?),
            ] {
                writeln!(out, "{}:", label)?;
                if pairs.is_empty() {
                    writeln!(out, "  (none)")?;
                }
                for (item, status) in pairs {
                    writeln!(out, "  {} ({})", item.name, status.state_name())?;
                }
            }
        }
    }

    for n in sink.drain() {
        let (recipient, target) = service.read(|reg| {
            Ok((
                reg.user(n.recipient)?.username.to_string(),
                reg.item(n.target)?.name.to_string(),
            ))
        })?;
        writeln!(out, "Notified {}: {} {}", recipient, n.verb, target)?;
    }
    Ok(())
}

fn roles(service: &RegistryService, owner: GroupOwner, user: UserId) -> RegistryResult<String> {
    let roles = service.read(|reg| Ok(reg.roles_of(owner, user)))?;
    if roles.is_empty() {
        return Ok("(none)".into());
    }
    Ok(roles
        .iter()
        .map(|r| r.label())
        .collect::<Vec<_>>()
        .join(", "))
}

// ============================================================================
// Name resolution: every record may be given by name or by ID
// ============================================================================

fn find_user(service: &RegistryService, name: &str) -> RegistryResult<UserId> {
    service.read(|reg| {
        if let Ok(id) = name.parse::<UserId>() {
            return Ok(reg.user(id)?.id);
        }
        reg.user_by_name(name)
            .map(|u| u.id)
            .ok_or_else(|| not_found("user", name))
    })
}

fn find_workgroup(service: &RegistryService, name: &str) -> RegistryResult<WorkgroupId> {
    service.read(|reg| {
        if let Ok(id) = name.parse::<WorkgroupId>() {
            return Ok(reg.workgroup(id)?.id);
        }
        reg.workgroup_by_name(name)
            .map(|wg| wg.id)
            .ok_or_else(|| not_found("workgroup", name))
    })
}

fn find_authority(service: &RegistryService, name: &str) -> RegistryResult<AuthorityId> {
    service.read(|reg| {
        if let Ok(id) = name.parse::<AuthorityId>() {
            return Ok(reg.authority(id)?.id);
        }
        reg.authority_by_name(name)
            .map(|ra| ra.id)
            .ok_or_else(|| not_found("registration authority", name))
    })
}

fn find_item(service: &RegistryService, name: &str) -> RegistryResult<ItemId> {
    service.read(|reg| find_item_in(reg, name))
}

fn find_item_in(reg: &Registry, name: &str) -> RegistryResult<ItemId> {
    if let Ok(id) = name.parse::<ItemId>() {
        return Ok(reg.item(id)?.id);
    }
    reg.item_by_name(name)
        .map(|i| i.id)
        .ok_or_else(|| not_found("item", name))
}

fn find_owner(service: &RegistryService, owner: OwnerArg, name: &str) -> RegistryResult<GroupOwner> {
    Ok(match owner {
        OwnerArg::Workgroup => find_workgroup(service, name)?.into(),
        OwnerArg::Authority => find_authority(service, name)?.into(),
    })
}

fn not_found(what: &str, name: &str) -> RegistryError {
    RegistryError::InvalidInput(format!("no {what} named \"{name}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mdr(dir: &TempDir, args: &[&str]) -> String {
        let cfg = CoreConfig::new(
            dir.path().join("registry.yaml"),
            DEFAULT_LOCKED_STATE,
            DEFAULT_PUBLIC_STATE,
        )
        .expect("config");
        let cli = Cli::try_parse_from(std::iter::once("mdr").chain(args.iter().copied()))
            .expect("parse args");
        let mut out = Vec::new();
        run(cli, Arc::new(cfg), &mut out).expect("command succeeds");
        String::from_utf8(out).expect("utf8 output")
    }

    fn mdr_err(dir: &TempDir, args: &[&str]) -> String {
        let cfg = CoreConfig::new(
            dir.path().join("registry.yaml"),
            DEFAULT_LOCKED_STATE,
            DEFAULT_PUBLIC_STATE,
        )
        .expect("config");
        let cli = Cli::try_parse_from(std::iter::once("mdr").chain(args.iter().copied()))
            .expect("parse args");
        let mut out = Vec::new();
        run(cli, Arc::new(cfg), &mut out)
            .expect_err("command fails")
            .to_string()
    }

    fn seeded() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        mdr(&dir, &["init"]);
        mdr(&dir, &["add-user", "admin", "--superuser"]);
        for user in ["eddie", "reggie", "olive"] {
            mdr(&dir, &["--as", "admin", "add-user", user]);
        }
        mdr(&dir, &["--as", "admin", "add-authority", "Standards Council"]);
        mdr(
            &dir,
            &[
                "--as",
                "admin",
                "add-workgroup",
                "Cancer Outcomes",
                "--authority",
                "Standards Council",
            ],
        );
        mdr(&dir, &["--as", "admin", "join", "Cancer Outcomes", "eddie"]);
        mdr(
            &dir,
            &["--as", "admin", "grant", "workgroup", "Cancer Outcomes", "editor", "eddie"],
        );
        mdr(
            &dir,
            &["--as", "admin", "grant", "authority", "Standards Council", "registrar", "reggie"],
        );
        dir
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        assert!(mdr(&dir, &["init"]).starts_with("Initialised registry"));
        assert!(mdr(&dir, &["init"]).starts_with("Registry already exists"));
    }

    #[test]
    fn test_cascading_registration_end_to_end() {
        let dir = seeded();
        for (kind, name) in [
            ("object_class", "Person"),
            ("property", "Age"),
            ("data_element_concept", "Person-Age"),
        ] {
            mdr(
                &dir,
                &["--as", "eddie", "add-item", kind, name, "--workgroup", "Cancer Outcomes"],
            );
        }
        mdr(&dir, &["--as", "eddie", "link", "Person-Age", "object_class", "Person"]);
        mdr(&dir, &["--as", "eddie", "link", "Person-Age", "property", "Age"]);

        let out = mdr(
            &dir,
            &[
                "--as",
                "reggie",
                "register",
                "Person-Age",
                "Standards Council",
                "standard",
                "--date",
                "2024-06-01",
                "--cascade",
            ],
        );
        assert!(out.contains("Person-Age is Standard for Standards Council"));

        let out = mdr(&dir, &["--as", "olive", "status", "Person"]);
        assert!(out.contains("Person is Standard for Standards Council since 2024-06-01"));

        let out = mdr(&dir, &["list", "--public"]);
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_permission_errors_are_reported() {
        let dir = seeded();
        mdr(
            &dir,
            &["--as", "eddie", "add-item", "object_class", "Person", "--workgroup", "Cancer Outcomes"],
        );
        let err = mdr_err(
            &dir,
            &["--as", "eddie", "register", "Person", "Standards Council", "standard"],
        );
        assert!(err.contains("permission denied"));

        let out = mdr(&dir, &["can", "register", "reggie", "Person", "--authority", "Standards Council"]);
        assert!(out.starts_with("yes"));
        let out = mdr(&dir, &["can", "view", "olive", "Person"]);
        assert_eq!(out.trim(), "no (no rule matched)");
    }

    #[test]
    fn test_rename_and_leave() {
        let dir = seeded();
        let out = mdr(&dir, &["--as", "admin", "rename-workgroup", "Cancer Outcomes", "Oncology"]);
        assert!(out.contains("Oncology Viewer, Oncology Editor, Oncology Super-Editor, Oncology Manager"));

        let out = mdr(&dir, &["--as", "admin", "leave", "Oncology", "eddie"]);
        assert!(out.contains("Removed eddie"));
        let out = mdr(
            &dir,
            &["--as", "admin", "revoke", "workgroup", "Oncology", "viewer", "eddie"],
        );
        assert!(out.ends_with("(none)\n"));
    }

    #[test]
    fn test_favourite_reports_notifications() {
        let dir = seeded();
        mdr(
            &dir,
            &["--as", "eddie", "add-item", "object_class", "Person", "--workgroup", "Cancer Outcomes"],
        );
        mdr(&dir, &["favourite", "eddie", "Person"]);
        let out = mdr(
            &dir,
            &["--as", "reggie", "register", "Person", "Standards Council", "candidate"],
        );
        assert!(out.contains("Notified eddie: changed the status of a favourite item Person"));
    }
}
