use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use virtseed::builder::executor::HostExecutorBuilder;
use virtseed::builder::Builder;
use virtseed::config::{self, ConfigError};
use virtseed::descriptor::DESCRIPTOR_FILENAME;
use virtseed::provisioner::Provisioner;

fn write_config(server_url: &str, base: &Path) -> PathBuf {
    let config_path = base.join("config.json");
    let json = serde_json::json!({
        "vm_name": "dev-guest",
        "memory": 2048,
        "cpus": 2,
        "os_variant": "rhel9.4",
        "firmware_dir": base.join("firmware"),
        "ovmf_base_url": format!("{}/ovmf", server_url),
        "ovmf_code": "CODE.fd",
        "ovmf_vars": "VARS.fd",
        "check_packages": false,
        "qcow2_image_url": format!("{}/guest.qcow2", server_url),
        "qcow2_image_path": base.join("images/guest.qcow2"),
        "firmware_descriptor_dir": base.join("firmware.d"),
    });
    std::fs::write(&config_path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
    config_path
}

/// One full run against the loaded configuration, with the provisioning tool
/// and the reload delegate replaced by harmless binaries
async fn run_once(config_path: &Path, base: &Path) -> PathBuf {
    let executor = HostExecutorBuilder::new()
        .with_output_dir(base.join("out"))
        .with_virt_install(PathBuf::from("/bin/echo"))
        .with_reload_program("true".to_string())
        .try_build()
        .unwrap();
    let config = config::load(config_path).unwrap().with_executor(executor);
    Provisioner::new().provision(config).await.unwrap()
}

#[tokio::test]
async fn provision_twice_transfers_each_artifact_once() {
    let mut server = mockito::Server::new_async().await;
    let code_head = server.mock("HEAD", "/ovmf/CODE.fd").expect(1).create_async().await;
    let code_get = server
        .mock("GET", "/ovmf/CODE.fd")
        .with_body("code-image")
        .expect(1)
        .create_async()
        .await;
    let vars_head = server.mock("HEAD", "/ovmf/VARS.fd").expect(1).create_async().await;
    let vars_get = server
        .mock("GET", "/ovmf/VARS.fd")
        .with_body("vars-image")
        .expect(1)
        .create_async()
        .await;
    let disk_head = server.mock("HEAD", "/guest.qcow2").expect(1).create_async().await;
    let disk_get = server
        .mock("GET", "/guest.qcow2")
        .with_body("qcow2-image")
        .expect(1)
        .create_async()
        .await;

    let base = tempfile::tempdir().expect("failed to create temporary directory");
    let config_path = write_config(&server.url(), base.path());

    let definition = run_once(&config_path, base.path()).await;
    assert_eq!(definition, base.path().join("out/dev-guest.xml"));
    let emitted = std::fs::read_to_string(&definition).unwrap();
    assert!(!emitted.is_empty());
    assert!(emitted.contains("--name dev-guest"));

    assert_eq!(
        std::fs::read(base.path().join("firmware/CODE.fd")).unwrap(),
        b"code-image"
    );
    assert_eq!(
        std::fs::read(base.path().join("firmware/VARS.fd")).unwrap(),
        b"vars-image"
    );
    assert_eq!(
        std::fs::read(base.path().join("images/guest.qcow2")).unwrap(),
        b"qcow2-image"
    );
    assert!(base.path().join("firmware.d").join(DESCRIPTOR_FILENAME).exists());

    // fetched artifacts end up owner/group readable only
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(base.path().join("images/guest.qcow2"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    let descriptor_before = std::fs::read_to_string(
        base.path().join("firmware.d").join(DESCRIPTOR_FILENAME),
    )
    .unwrap();

    // Second run: everything already in place; the expect(1) mocks above
    // fail the test if any artifact is probed or transferred again
    let second = run_once(&config_path, base.path()).await;
    assert_eq!(second, definition);
    let descriptor_after = std::fs::read_to_string(
        base.path().join("firmware.d").join(DESCRIPTOR_FILENAME),
    )
    .unwrap();
    assert_eq!(descriptor_before, descriptor_after);

    code_head.assert_async().await;
    code_get.assert_async().await;
    vars_head.assert_async().await;
    vars_get.assert_async().await;
    disk_head.assert_async().await;
    disk_get.assert_async().await;
}

#[tokio::test]
async fn present_artifact_is_never_refetched() {
    let mut server = mockito::Server::new_async().await;
    let code_head = server.mock("HEAD", "/ovmf/CODE.fd").expect(0).create_async().await;
    let code_get = server.mock("GET", "/ovmf/CODE.fd").expect(0).create_async().await;
    let _vars_head = server.mock("HEAD", "/ovmf/VARS.fd").create_async().await;
    let _vars_get = server
        .mock("GET", "/ovmf/VARS.fd")
        .with_body("vars-image")
        .create_async()
        .await;
    let _disk_head = server.mock("HEAD", "/guest.qcow2").create_async().await;
    let _disk_get = server
        .mock("GET", "/guest.qcow2")
        .with_body("qcow2-image")
        .create_async()
        .await;

    let base = tempfile::tempdir().expect("failed to create temporary directory");
    let config_path = write_config(&server.url(), base.path());

    // Pre-place the code image; presence alone marks it complete, even
    // though the content differs from what the server would serve
    std::fs::create_dir_all(base.path().join("firmware")).unwrap();
    std::fs::write(base.path().join("firmware/CODE.fd"), b"local-copy").unwrap();

    run_once(&config_path, base.path()).await;

    assert_eq!(
        std::fs::read(base.path().join("firmware/CODE.fd")).unwrap(),
        b"local-copy"
    );
    code_head.assert_async().await;
    code_get.assert_async().await;
}

#[test]
fn absent_configuration_is_fatal_before_any_side_effect() {
    let base = tempfile::tempdir().expect("failed to create temporary directory");
    let result = config::load(&base.path().join("missing.json"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));

    // nothing was created next to the missing file
    let entries: Vec<_> = std::fs::read_dir(base.path()).unwrap().collect();
    assert!(entries.is_empty());
}
