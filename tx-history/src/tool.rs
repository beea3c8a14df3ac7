use daemonize::Daemonize;
use std::fs::File;

pub fn daemonize_process(service_name: &str) {
    let root_dir = txh_util::get_service_dir(service_name);
    if let Err(e) = std::fs::create_dir_all(&root_dir) {
        println!("Failed to create service directory {}: {}", root_dir.display(), e);
        std::process::exit(1);
    }

    let (stdout, stderr) = match (File::create("/dev/null"), File::create("/dev/null")) {
        (Ok(stdout), Ok(stderr)) => (stdout, stderr),
        _ => {
            println!("Failed to open /dev/null for {} service", service_name);
            std::process::exit(1);
        }
    };

    let pid_file = root_dir.join(format!("{}.pid", service_name));
    let daemonize = Daemonize::new()
        .pid_file(pid_file)
        .chown_pid_file(true)
        .stdout(stdout)
        .stderr(stderr)
        .working_directory(root_dir);

    match daemonize.start() {
        Ok(_) => {
            info!("{} service daemonized successfully", service_name);
        }
        Err(e) => {
            println!("Error daemonizing {} service: {}", service_name, e);
            std::process::exit(1);
        }
    }
}
