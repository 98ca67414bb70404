use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(
    papersort_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match (papersort_home, home_dir) {
        (Some(home), _) => Some(home.join(".env")),
        (None, Some(home)) => Some(home.join(".papersort/.env")),
        (None, None) => None,
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("PAPERSORT_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_papersort_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/papersort")),
            Some(PathBuf::from("/home/alice")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/papersort/.env")));
    }

    #[test]
    fn fallback_uses_dot_dir_under_home() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/.papersort/.env")));
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
