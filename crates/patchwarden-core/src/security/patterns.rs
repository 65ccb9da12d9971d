//! Static rule tables used by the guardrails

use lazy_static::lazy_static;
use regex::Regex;

/// Path segments that are never touched (build output, VCS, credentials, IDE state)
pub const DENIED_SEGMENTS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".ssh",
    ".aws",
    ".gnupg",
    ".kube",
    ".docker",
    ".idea",
    ".vscode",
    "node_modules",
    "__pycache__",
    ".venv",
    "target",
    "build",
    "dist",
];

/// File extensions carrying keys, certificates or secrets
pub const DENIED_EXTENSIONS: &[&str] = &[
    "pem", "key", "crt", "cer", "der", "p12", "pfx", "jks", "keystore", "asc", "gpg", "secret",
    "secrets", "env",
];

/// Whole file names that hold credentials
pub const DENIED_FILE_NAMES: &[&str] = &[
    ".env",
    ".netrc",
    ".npmrc",
    ".pypirc",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    "credentials",
    "credentials.json",
    "secrets.yml",
    "secrets.yaml",
];

lazy_static! {
    /// Shell metacharacters and privilege escalation in command arguments
    pub static ref DANGEROUS_ARGUMENTS: Vec<(&'static str, Regex)> = vec![
        ("output redirection", Regex::new(r"^>{1,2}|[^\\]>{1,2}|^\d?>").unwrap()),
        ("input redirection", Regex::new(r"<").unwrap()),
        ("command chaining", Regex::new(r"&&|\|\||;|&$").unwrap()),
        ("pipe", Regex::new(r"\|").unwrap()),
        ("command substitution", Regex::new(r"`|\$\(").unwrap()),
        ("privilege escalation", Regex::new(r"^(sudo|su|doas|pkexec)$").unwrap()),
        ("path traversal", Regex::new(r"(^|/)\.\.(/|$)").unwrap()),
        ("find action", Regex::new(r"^-(exec|execdir|ok|okdir|delete|fprint0?|fprintf|fls)$").unwrap()),
        ("inline code execution", Regex::new(r"^--(eval|print|require|import|exec|command)(=|$)").unwrap()),
    ];

    /// Arguments that turn a specific program into an arbitrary code runner.
    /// Each entry is (rule, program base name, argument).
    pub static ref PROGRAM_ARGUMENTS: Vec<(&'static str, Regex, Regex)> = vec![
        (
            "inline code execution",
            Regex::new(r"^(python[\d.]*|pypy[\d.]*|node|nodejs|deno|bun|ruby|perl|php|lua|sh|bash|dash|zsh|ksh|pwsh)$").unwrap(),
            Regex::new(r"^-[A-Za-z]*[ceEpr]").unwrap(),
        ),
        (
            "git configuration override",
            Regex::new(r"^git$").unwrap(),
            Regex::new(r"^(-c|--config-env(=.*)?|--upload-pack(=.*)?|--receive-pack(=.*)?|--exec-path(=.*)?)$").unwrap(),
        ),
        (
            "package execution",
            Regex::new(r"^(npm|yarn|pnpm)$").unwrap(),
            Regex::new(r"^(exec|x|dlx)$").unwrap(),
        ),
    ];

    /// Constructs a generated patch must never introduce
    pub static ref DANGEROUS_CONSTRUCTS: Vec<(&'static str, Regex)> = vec![
        ("dynamic evaluation", Regex::new(r"\beval\s*\(").unwrap()),
        ("dynamic execution", Regex::new(r"\bexec\s*\(").unwrap()),
        ("dynamic import", Regex::new(r"__import__\s*\(").unwrap()),
        ("dynamic function", Regex::new(r"\bnew\s+Function\s*\(").unwrap()),
        ("shell execution", Regex::new(r"\bos\.(system|popen|exec[lv]p?e?)\s*\(").unwrap()),
        ("process spawning", Regex::new(r"\bsubprocess\.(call|run|Popen|check_output|check_call)\b").unwrap()),
        ("process spawning", Regex::new(r"\bchild_process\b").unwrap()),
        ("process spawning", Regex::new(r"Runtime\.getRuntime\(\)\.exec").unwrap()),
        ("process spawning", Regex::new(r"\bprocess::Command\b").unwrap()),
        ("unsafe deserialization", Regex::new(r"\bpickle\.loads?\s*\(").unwrap()),
        ("unsafe deserialization", Regex::new(r"\bmarshal\.loads?\s*\(").unwrap()),
        ("unsafe deserialization", Regex::new(r"\byaml\.(?:unsafe_)?load\s*\(").unwrap()),
        ("unsafe deserialization", Regex::new(r"\bunserialize\s*\(").unwrap()),
    ];

    /// Credential-shaped strings
    pub static ref CREDENTIAL_SIGNATURES: Vec<(&'static str, Regex)> = vec![
        ("AWS access key", Regex::new(r"AKIA[0-9A-Z]{16}").unwrap()),
        ("private key block", Regex::new(r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY-----").unwrap()),
        ("GitHub token", Regex::new(r"\bgh[pousr]_[A-Za-z0-9]{36,}\b").unwrap()),
        ("Slack token", Regex::new(r"\bxox[abprs]-[A-Za-z0-9-]{10,}").unwrap()),
        ("hardcoded password", Regex::new(r#"(?i)password\s*[:=]\s*['"][^'"]+['"]"#).unwrap()),
        ("hardcoded secret", Regex::new(r#"(?i)(api[_-]?key|secret[_-]?key|access[_-]?token|client[_-]?secret)\s*[:=]\s*['"][^'"]{8,}['"]"#).unwrap()),
        ("generic private key", Regex::new(r#"(?i)private_key\s*=\s*['"][^'"]+['"]"#).unwrap()),
    ];
}

/// Names of all dangerous constructs matching `line`
pub fn dangerous_constructs(line: &str) -> Vec<&'static str> {
    DANGEROUS_CONSTRUCTS
        .iter()
        .filter(|(_, re)| re.is_match(line))
        .map(|(name, _)| *name)
        .collect()
}

/// Names of all credential signatures matching `line`
pub fn credential_signatures(line: &str) -> Vec<&'static str> {
    CREDENTIAL_SIGNATURES
        .iter()
        .filter(|(_, re)| re.is_match(line))
        .map(|(name, _)| *name)
        .collect()
}

/// First dangerous-argument rule matching `arg`
pub fn dangerous_argument(arg: &str) -> Option<&'static str> {
    DANGEROUS_ARGUMENTS
        .iter()
        .find(|(_, re)| re.is_match(arg))
        .map(|(name, _)| *name)
}

/// First program-specific rule matching `arg` for `program`
pub fn program_argument(program: &str, arg: &str) -> Option<&'static str> {
    PROGRAM_ARGUMENTS
        .iter()
        .find(|(_, p, a)| p.is_match(program) && a.is_match(arg))
        .map(|(name, _, _)| *name)
}
