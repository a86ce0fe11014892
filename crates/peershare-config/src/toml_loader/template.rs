//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# peershare configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[identity]
# user_id = ""             # id the relay knows you by
# display_name = ""

[signaling]
# url = "ws://127.0.0.1:8090"
# reconnect_delay_secs = 1        # 1-60
# max_reconnect_delay_secs = 30
# connect_timeout_secs = 15       # 1-120

# [[ice.servers]]
# urls = ["stun:stun.l.google.com:19302"]
#
# [[ice.servers]]
# urls = ["turn:turn.example.org:3478"]
# username = "user"
# credential = "secret"

[restart]
# max_attempts = 3          # 1-10
# timeout_secs = 15         # 1-300

[capture]
# audio = true

[logging]
# level = "info"            # trace, debug, info, warn, error
"##
    .to_string()
}
