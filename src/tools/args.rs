/// Per-tool command-line layout.
///
/// Profile arguments come from [`crate::config::ToolProfiles`]; this module
/// only decides where the target and caller-supplied extras go.
pub fn build_args(
    tool: &str,
    target: Option<&str>,
    profile_args: &[String],
    extra_args: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let target_flag = |flag: &str, args: &mut Vec<String>| {
        if let Some(t) = target {
            args.push(flag.to_string());
            args.push(t.to_string());
        }
    };

    match tool {
        "sqlmap" | "nuclei" => {
            target_flag("-u", &mut args);
            args.extend_from_slice(profile_args);
        }
        "wpscan" => {
            target_flag("--url", &mut args);
            args.extend_from_slice(profile_args);
        }
        "nikto" => {
            target_flag("-h", &mut args);
            args.extend_from_slice(profile_args);
        }
        "wapiti" => {
            target_flag("-u", &mut args);
            args.extend(["-f".to_string(), "json".to_string()]);
            args.extend_from_slice(profile_args);
        }
        // target last
        "nmap" | "sslyze" => {
            args.extend_from_slice(profile_args);
            args.extend(target.map(String::from));
        }
        _ => {
            args.extend(target.map(String::from));
            args.extend_from_slice(profile_args);
        }
    }

    args.extend_from_slice(extra_args);
    args
}
