//! Path glob matching for per-path response headers.

/// Check if `path` matches `pattern`.
///
/// `*` matches any run of characters except `/`, `?` one character except
/// `/`, and `**` any run including `/`. A pattern matching any prefix of
/// the path counts as a match, as does a literal prefix. The empty pattern
/// matches everything; `*` does not match `/`.
pub fn match_path(path: &str, pattern: &str) -> bool {
    if path.starts_with(pattern) {
        return true;
    }
    if pattern == "*" && path == "/" {
        return false;
    }

    let pattern = collapse_stars(pattern);
    let pat = pattern.as_bytes();
    let path = path.as_bytes();
    let (m, n) = (pat.len(), path.len());

    // dp[i][j]: pat[..i] matches path[..j]
    let mut dp = vec![vec![false; n + 1]; m + 1];
    dp[0][0] = true;
    for i in 1..=m {
        if pat[i - 1] == b'*' {
            dp[i][0] = dp[i - 1][0];
        }
    }

    for i in 1..=m {
        let double = pat[i - 1] == b'*' && i > 1 && pat[i - 2] == b'*';
        for j in 1..=n {
            dp[i][j] = match pat[i - 1] {
                b'*' if double || path[j - 1] != b'/' => {
                    dp[i - 1][j] || dp[i][j - 1] || dp[i - 1][j - 1]
                }
                b'*' => dp[i - 1][j],
                b'?' => path[j - 1] != b'/' && dp[i - 1][j - 1],
                c => c == path[j - 1] && dp[i - 1][j - 1],
            };
        }
    }

    dp[m].iter().any(|&matched| matched)
}

/// Check if `path` matches any of `patterns`.
pub fn match_any(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| match_path(path, p))
}

/// Collapse runs of three or more `*` into `**`.
fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut run = 0;
    for ch in pattern.chars() {
        if ch == '*' {
            run += 1;
            if run <= 2 {
                out.push(ch);
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}
