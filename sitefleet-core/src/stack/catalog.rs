//! The seven services of a tenant stack.
//!
//! Services reference each other by container name only; the tenant network
//! resolves those names.

use std::{collections::BTreeMap, time::Duration};

use url::Url;

use super::{
    DeploymentConfig,
    spec::{ContainerSpec, HealthCheck, PortBinding, RestartPolicy, VolumeMount},
};
use crate::{
    error::{OrchestratorError, Result},
    naming::{PREFIX_LABEL, SERVICE_LABEL, ServiceKind, StackNames},
    ports::{PortAssignment, PortRole},
    settings::OrchestratorSettings,
};

const BACKEND_PORT: u16 = 3000;
const POSTGRES_PORT: u16 = 5432;
const REDIS_PORT: u16 = 6379;
const PROXY_DB_NAME: &str = "npm";
const PROXY_DB_USER: &str = "npm";

/// What the deployer waits for after starting a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthGate {
    /// Poll the health monitor, then sleep `settle`.
    Wait { timeout: Duration, settle: Duration },
    /// Fixed delay for services without a usable health check.
    Settle(Duration),
    None,
}

#[derive(Debug, Clone)]
pub struct ServiceStep {
    pub spec: ContainerSpec,
    pub gate: HealthGate,
}

/// Build the dependency-ordered deployment plan.
pub fn build_stack_plan(
    config: &DeploymentConfig,
    ports: &PortAssignment,
    settings: &OrchestratorSettings,
) -> Result<Vec<ServiceStep>> {
    let names = StackNames::new(&config.prefix);
    let timings = &settings.timings;
    let images = &settings.images;
    let base = |service: ServiceKind, image: &str| base_spec(&names, service, image);

    let mut db = base(ServiceKind::Db, &images.db);
    db.env = env([
        ("POSTGRES_USER", settings.database_user.as_str()),
        ("POSTGRES_PASSWORD", config.database_password.as_str()),
        ("POSTGRES_DB", settings.database_name.as_str()),
    ]);
    db.volumes = mounts(&names, ServiceKind::Db, &["/var/lib/postgresql/data"]);
    db.health_check = Some(HealthCheck {
        command: format!(
            "pg_isready -U {} -d {}",
            settings.database_user, settings.database_name
        ),
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(5),
        retries: 5,
        start_period: Duration::from_secs(10),
    });

    let mut cache = base(ServiceKind::Cache, &images.cache);
    cache.command = vec!["redis-server".into(), "--appendonly".into(), "yes".into()];
    cache.volumes = mounts(&names, ServiceKind::Cache, &["/data"]);
    cache.health_check = Some(HealthCheck {
        command: "redis-cli ping".into(),
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(3),
        retries: 5,
        start_period: Duration::from_secs(5),
    });

    let database_url = database_url(
        &settings.database_user,
        &config.database_password,
        &names.container(ServiceKind::Db),
        &settings.database_name,
    )?;
    let redis_url = format!("redis://{}:{REDIS_PORT}", names.container(ServiceKind::Cache));
    let backend_port = BACKEND_PORT.to_string();

    let mut backend = base(ServiceKind::Backend, &images.backend);
    backend.env = env([
        ("DATABASE_URL", database_url.as_str()),
        ("REDIS_URL", redis_url.as_str()),
        ("SESSION_SECRET", config.session_secret.as_str()),
        ("ADMIN_EMAIL", config.admin_email.as_str()),
        ("ADMIN_PASSWORD", config.admin_password.as_str()),
        ("SITE_NAME", config.name.as_str()),
        ("SITE_DOMAIN", config.domain.as_str()),
        ("PORT", backend_port.as_str()),
    ]);
    backend.ports = bindings(ports, &[PortRole::Backend]);
    backend.volumes = mounts(&names, ServiceKind::Backend, &["/app/uploads"]);
    backend.health_check = Some(HealthCheck {
        command: format!("wget -qO- http://127.0.0.1:{BACKEND_PORT}/health"),
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(5),
        retries: 30,
        start_period: Duration::from_secs(300),
    });

    let upstream = names.container(ServiceKind::Backend);
    let mut edge = base(ServiceKind::Edge, &images.edge);
    edge.env = env([
        ("UPSTREAM_HOST", upstream.as_str()),
        ("UPSTREAM_PORT", backend_port.as_str()),
    ]);
    edge.ports = bindings(ports, &[PortRole::Web]);

    let mut proxy_db = base(ServiceKind::ProxyDb, &images.proxy_db);
    proxy_db.env = env([
        ("MYSQL_ROOT_PASSWORD", config.proxy_db_root_password.as_str()),
        ("MYSQL_DATABASE", PROXY_DB_NAME),
        ("MYSQL_USER", PROXY_DB_USER),
        ("MYSQL_PASSWORD", config.proxy_db_password.as_str()),
    ]);
    proxy_db.volumes = mounts(&names, ServiceKind::ProxyDb, &["/var/lib/mysql"]);

    let proxy_db_host = names.container(ServiceKind::ProxyDb);
    let mut proxy = base(ServiceKind::Proxy, &images.proxy);
    proxy.env = env([
        ("DB_MYSQL_HOST", proxy_db_host.as_str()),
        ("DB_MYSQL_PORT", "3306"),
        ("DB_MYSQL_USER", PROXY_DB_USER),
        ("DB_MYSQL_PASSWORD", config.proxy_db_password.as_str()),
        ("DB_MYSQL_NAME", PROXY_DB_NAME),
    ]);
    proxy.ports = bindings(ports, &[PortRole::ProxyHttp, PortRole::ProxyAdmin]);
    proxy.volumes = mounts(&names, ServiceKind::Proxy, &["/data", "/etc/letsencrypt"]);

    let mut console = base(ServiceKind::Console, &images.console);
    console.ports = bindings(ports, &[PortRole::Console]);
    console.volumes = mounts(&names, ServiceKind::Console, &["/data"]);
    console.volumes.push(VolumeMount::host_read_only(
        &settings.engine_socket,
        "/var/run/docker.sock",
    ));

    Ok(vec![
        ServiceStep {
            spec: db,
            gate: HealthGate::Wait {
                timeout: timings.db_timeout,
                settle: timings.db_settle,
            },
        },
        ServiceStep {
            spec: cache,
            gate: HealthGate::Wait {
                timeout: timings.cache_timeout,
                settle: Duration::ZERO,
            },
        },
        ServiceStep {
            spec: backend,
            gate: HealthGate::Wait {
                timeout: timings.backend_timeout,
                settle: Duration::ZERO,
            },
        },
        ServiceStep {
            spec: edge,
            gate: HealthGate::None,
        },
        ServiceStep {
            spec: proxy_db,
            gate: HealthGate::Settle(timings.proxy_db_settle),
        },
        ServiceStep {
            spec: proxy,
            gate: HealthGate::None,
        },
        ServiceStep {
            spec: console,
            gate: HealthGate::None,
        },
    ])
}

/// Gate re-applied when an existing stack is started again.
pub fn restart_gate(service: ServiceKind, settings: &OrchestratorSettings) -> HealthGate {
    let timings = &settings.timings;
    match service {
        ServiceKind::Db => HealthGate::Wait {
            timeout: timings.db_timeout,
            settle: timings.db_settle,
        },
        ServiceKind::Cache => HealthGate::Wait {
            timeout: timings.cache_timeout,
            settle: Duration::ZERO,
        },
        ServiceKind::Backend => HealthGate::Wait {
            timeout: timings.backend_timeout,
            settle: Duration::ZERO,
        },
        _ => HealthGate::None,
    }
}

fn base_spec(names: &StackNames, service: ServiceKind, image: &str) -> ContainerSpec {
    ContainerSpec {
        service,
        name: names.container(service),
        image: image.to_string(),
        env: BTreeMap::new(),
        ports: Vec::new(),
        volumes: Vec::new(),
        network: names.network(),
        restart: RestartPolicy::UnlessStopped,
        health_check: None,
        labels: env([
            (PREFIX_LABEL, names.prefix()),
            (SERVICE_LABEL, service.as_str()),
        ]),
        command: Vec::new(),
    }
}

fn env<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn bindings(ports: &PortAssignment, roles: &[PortRole]) -> Vec<PortBinding> {
    roles
        .iter()
        .filter_map(|role| {
            ports.get(role).map(|host| PortBinding {
                host: *host,
                container: role.container_port(),
            })
        })
        .collect()
}

/// Pair each of the service's volumes with a mount target, in order.
fn mounts(names: &StackNames, service: ServiceKind, targets: &[&str]) -> Vec<VolumeMount> {
    names
        .volumes_for(service)
        .into_iter()
        .zip(targets)
        .map(|(volume, target)| VolumeMount::volume(volume, *target))
        .collect()
}

fn database_url(user: &str, password: &str, host: &str, database: &str) -> Result<String> {
    let invalid = |what: &str| {
        OrchestratorError::InvalidInput(format!("cannot build database url: bad {what}"))
    };
    let mut url = Url::parse(&format!("postgresql://{host}:{POSTGRES_PORT}/{database}"))
        .map_err(|_| invalid("host"))?;
    url.set_username(user).map_err(|_| invalid("user"))?;
    url.set_password(Some(password))
        .map_err(|_| invalid("password"))?;
    Ok(url.to_string())
}
