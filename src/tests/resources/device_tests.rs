use crate::{
    ConvergeError, DeviceIdentity, DeviceOperation, DeviceReconciler, DeviceSpec, InstanceId,
    InstanceKind, PowerState,
    core::domain::model::device::{Device, DiskDevice, DisplayDevice, NicDevice, NicType},
    fetch,
    tests::fake_remote::{FakeInstance, FakeRemote},
};
use serde_json::json;

fn disk(source: &str, destination: &str) -> Device {
    Device::Disk(DiskDevice {
        source: source.to_string(),
        destination: Some(destination.to_string()),
        readonly: false,
    })
}

fn named(name: &str, device: Device) -> DeviceSpec {
    DeviceSpec::named(DeviceIdentity::new_unchecked(name), device)
}

async fn observed_devices(remote: &FakeRemote, kind: InstanceKind, id: &InstanceId) -> Vec<DeviceSpec> {
    fetch(remote, kind, id).await.unwrap().unwrap().devices
}

#[tokio::test]
async fn test_missing_disk_is_created_with_flat_attributes() {
    let remote = FakeRemote::new().with_instance(FakeInstance::container("web", PowerState::Stopped));
    let id = InstanceId::from("web");
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();

    let mut plan = vec![DeviceSpec::unnamed(disk("/src", "/dst"))];
    let summary = reconciler.reconcile(&mut plan, &[]).await.unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);

    let mutations = remote.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, "virt.instance.device_add");
    assert_eq!(
        mutations[0].params,
        json!(["web", {"dev_type": "DISK", "source": "/src", "destination": "/dst"}])
    );
}

#[tokio::test]
async fn test_undesired_devices_are_deleted_by_name() {
    let remote = FakeRemote::new().with_instance(
        FakeInstance::container("web", PowerState::Stopped)
            .with_device(json!({"name": "disk1", "dev_type": "DISK", "source": "/a", "destination": "/a"}))
            .with_device(json!({"name": "disk2", "dev_type": "DISK", "source": "/b", "destination": "/b"})),
    );
    let id = InstanceId::from("web");
    let state = observed_devices(&remote, InstanceKind::Container, &id).await;
    remote.clear_calls();

    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();
    let summary = reconciler.reconcile(&mut [], &state).await.unwrap();
    assert_eq!(summary.deleted, 2);

    let deletes: Vec<_> = remote
        .mutations()
        .into_iter()
        .map(|call| (call.method, call.params))
        .collect();
    assert_eq!(
        deletes,
        vec![
            ("virt.instance.device_delete".to_string(), json!(["web", "disk1"])),
            ("virt.instance.device_delete".to_string(), json!(["web", "disk2"])),
        ]
    );
}

#[tokio::test]
async fn test_one_operation_per_changed_device() {
    let remote = FakeRemote::new().with_instance(
        FakeInstance::container("web", PowerState::Running)
            .with_device(json!({"name": "keep", "dev_type": "DISK", "source": "/k", "destination": "/k"}))
            .with_device(json!({"name": "change", "dev_type": "DISK", "source": "/c", "destination": "/c"}))
            .with_device(json!({"name": "gone", "dev_type": "DISK", "source": "/g", "destination": "/g"})),
    );
    let id = InstanceId::from("web");
    let state = observed_devices(&remote, InstanceKind::Container, &id).await;
    remote.clear_calls();

    let mut plan = vec![
        named("keep", disk("/k", "/k")),
        named(
            "change",
            Device::Disk(DiskDevice {
                source: "/c".to_string(),
                destination: Some("/c".to_string()),
                readonly: true,
            }),
        ),
        DeviceSpec::unnamed(disk("/n", "/n")),
    ];
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();
    reconciler.reconcile(&mut plan, &state).await.unwrap();

    let mutations = remote.mutations();
    let methods: Vec<_> = mutations.iter().map(|call| call.method.as_str()).collect();
    assert_eq!(
        methods,
        vec![
            "virt.instance.device_delete",
            "virt.instance.device_update",
            "virt.instance.device_add",
        ]
    );
    assert_eq!(mutations[0].params, json!(["web", "gone"]));
    assert_eq!(mutations[1].params[1]["name"], "change");
    assert_eq!(mutations[1].params[1]["readonly"], true);
}

#[tokio::test]
async fn test_matching_plan_issues_no_operations() {
    let remote = FakeRemote::new().with_instance(
        FakeInstance::container("web", PowerState::Running)
            .with_device(json!({"name": "data", "dev_type": "DISK", "source": "/d", "destination": "/d"}))
            .with_device(json!({"name": "eth0", "dev_type": "NIC", "network": "incusbr0", "nic_type": "BRIDGED", "mac": "00:16:3e:aa:bb:cc"})),
    );
    let id = InstanceId::from("web");
    let state = observed_devices(&remote, InstanceKind::Container, &id).await;
    remote.clear_calls();

    // The server-assigned MAC is not part of the plan and must not count as drift.
    let mut plan = vec![
        named("data", disk("/d", "/d")),
        named(
            "eth0",
            Device::Nic(NicDevice {
                network: Some("incusbr0".to_string()),
                nic_type: Some(NicType::Bridged),
                ..Default::default()
            }),
        ),
    ];
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();
    let summary = reconciler.reconcile(&mut plan, &state).await.unwrap();

    assert!(summary.is_noop());
    assert!(remote.mutations().is_empty());
}

#[tokio::test]
async fn test_echoed_server_defaults_are_not_drift() {
    let remote = FakeRemote::new().with_instance(
        FakeInstance::container("web", PowerState::Running)
            .with_device(json!({"name": "eth0", "dev_type": "NIC", "network": "incusbr0", "nic_type": "BRIDGED"}))
            .with_device(json!({"name": "vnc", "dev_type": "DISPLAY", "resolution": "1024x768", "bind": "127.0.0.1"})),
    );
    let id = InstanceId::from("web");
    let state = observed_devices(&remote, InstanceKind::Container, &id).await;
    remote.clear_calls();

    let mut plan = vec![
        named(
            "eth0",
            Device::Nic(NicDevice {
                network: Some("incusbr0".to_string()),
                ..Default::default()
            }),
        ),
        named("vnc", Device::Display(DisplayDevice::default())),
    ];
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();
    let summary = reconciler.reconcile(&mut plan, &state).await.unwrap();

    assert!(summary.is_noop());
    assert!(remote.mutations().is_empty());
}

#[tokio::test]
async fn test_explicit_display_resolution_change_is_an_update() {
    let remote = FakeRemote::new().with_instance(
        FakeInstance::container("web", PowerState::Running)
            .with_device(json!({"name": "vnc", "dev_type": "DISPLAY", "resolution": "1024x768", "bind": "127.0.0.1"})),
    );
    let id = InstanceId::from("web");
    let state = observed_devices(&remote, InstanceKind::Container, &id).await;
    remote.clear_calls();

    let mut plan = vec![named(
        "vnc",
        Device::Display(DisplayDevice {
            resolution: Some("1920x1080".to_string()),
            ..Default::default()
        }),
    )];
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();
    let summary = reconciler.reconcile(&mut plan, &state).await.unwrap();

    assert_eq!(summary.updated, 1);
    let mutations = remote.mutations();
    assert_eq!(mutations[0].method, "virt.instance.device_update");
    assert_eq!(mutations[0].params[1]["resolution"], "1920x1080");
}

#[tokio::test]
async fn test_vm_display_round_trips_without_drift() {
    let remote = FakeRemote::new().with_instance(FakeInstance::vm(5, "win", PowerState::Stopped));
    let id = InstanceId::Numeric(5);
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Vm, &id).unwrap();

    let mut plan = vec![DeviceSpec::unnamed(Device::Display(DisplayDevice {
        resolution: Some("1920x1080".to_string()),
        bind: Some("0.0.0.0".to_string()),
        web: true,
        password: Some("hunter2".to_string()),
        ..Default::default()
    }))];
    reconciler.reconcile(&mut plan, &[]).await.unwrap();

    let created = remote.mutations();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].method, "vm.device.create");
    assert_eq!(created[0].params[0]["attributes"]["dtype"], "DISPLAY");
    assert!(matches!(plan[0].identity, Some(DeviceIdentity::Id(_))));

    // The server allocated a port and does not echo the password.
    let state = observed_devices(&remote, InstanceKind::Vm, &id).await;
    remote.clear_calls();
    let summary = reconciler.reconcile(&mut plan, &state).await.unwrap();
    assert!(summary.is_noop());
    assert!(remote.mutations().is_empty());
}

#[tokio::test]
async fn test_failed_update_stops_the_cycle() {
    let remote = FakeRemote::new()
        .with_instance(
            FakeInstance::container("web", PowerState::Running)
                .with_device(json!({"name": "data", "dev_type": "DISK", "source": "/d", "destination": "/d"})),
        )
        .failing("virt.instance.device_update", "device is busy");
    let id = InstanceId::from("web");
    let state = observed_devices(&remote, InstanceKind::Container, &id).await;
    remote.clear_calls();

    let mut plan = vec![
        named("data", disk("/d", "/elsewhere")),
        DeviceSpec::unnamed(disk("/never", "/never")),
    ];
    let reconciler = DeviceReconciler::new(&remote, InstanceKind::Container, &id).unwrap();
    let err = reconciler.reconcile(&mut plan, &state).await.unwrap_err();

    match &err {
        ConvergeError::Device {
            operation,
            identity,
            source,
        } => {
            assert_eq!(*operation, DeviceOperation::Update);
            assert_eq!(identity, "data");
            assert!(source.to_string().contains("device is busy"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(remote.mutations().len(), 1);
}
