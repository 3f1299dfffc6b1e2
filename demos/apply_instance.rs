use instance_converge::{
    CancellationToken, ConvergeResult, DesiredState, Device, DeviceSpec, DiskDevice,
    HttpRpcGateway, InstanceKind, InstanceManager, InstanceSpec, Protocol, ProxyDevice,
};
use std::{env, time::Duration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ConvergeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let endpoint = env::var("CONVERGE_ENDPOINT").unwrap_or_else(|_| "https://nas.local".to_string());
    let api_key = env::var("CONVERGE_API_KEY").unwrap_or_default();

    let gateway = HttpRpcGateway::builder()
        .endpoint(endpoint)
        .api_key(api_key)
        .accept_invalid_certs(true)
        .build()?;
    let manager = InstanceManager::new(gateway);

    let mut spec = InstanceSpec::new(InstanceKind::Container, "demo-web")
        .with_create_param("image", "debian/bookworm")
        .with_device(DeviceSpec::unnamed(Device::Disk(DiskDevice {
            source: "/mnt/tank/www".to_string(),
            destination: Some("/var/www".to_string()),
            readonly: true,
        })))
        .with_device(DeviceSpec::unnamed(Device::Proxy(ProxyDevice {
            source_proto: Protocol::Tcp,
            source_port: 8080,
            dest_proto: Protocol::Tcp,
            dest_port: 80,
        })))
        .with_desired_state(DesiredState::Running)
        .with_timeouts(Duration::from_secs(120), Duration::from_secs(30));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let existing = manager.read(&spec.clone().with_id("demo-web")).await?;
    match existing {
        Some(mut current) => {
            current.devices = spec.devices;
            current.desired_state = spec.desired_state;
            manager.apply(&mut current, &cancel).await?;
            spec = current;
        }
        None => manager.create(&mut spec, &cancel).await?,
    }

    println!("Instance: {} ({:?})", spec.name, spec.id);
    println!("Observed state: {:?}", spec.observed_state);
    for device in &spec.devices {
        println!("  {:?} {:?}", device.identity, device.device);
    }
    Ok(())
}
