use crate::db::DashboardData;

const BAR_WIDTH: usize = 40;

/// Print the community KPI view. The data is fully loaded before this is
/// called, so rendering never partially fails.
pub fn render(data: &DashboardData) {
    println!("GitHub Community Analytics");
    println!("==========================");
    println!();
    println!("  Projects:      {:>8}", data.projects);
    println!("  Contributors:  {:>8}", data.contributors);
    println!("  Open issues:   {:>8}", data.open_issues);
    println!("  Pull requests: {:>8}", data.pull_requests);

    if !data.issues_by_month.is_empty() {
        println!();
        println!("Issues created by month");
        println!("{}", "-".repeat(64));
        let max = data.issues_by_month.iter().map(|(_, n)| *n).max().unwrap_or(1);
        for (month, n) in &data.issues_by_month {
            println!("  {month:<8} {n:>6}  {}", bar(*n, max));
        }
    }

    if !data.prs_by_project.is_empty() {
        println!();
        println!("Pull requests by project");
        println!("{}", "-".repeat(64));
        let max = data.prs_by_project.iter().map(|(_, n)| *n).max().unwrap_or(1);
        for (name, n) in &data.prs_by_project {
            println!("  {:<24} {n:>6}  {}", truncate(name, 24), bar(*n, max));
        }
    }

    if !data.top_contributors.is_empty() {
        println!();
        println!("Top contributors");
        println!("{}", "-".repeat(64));
        println!("  {:>3}  {:<24} {:<24} {:>10}", "#", "login", "login_clean", "github_id");
        for (i, c) in data.top_contributors.iter().enumerate() {
            println!(
                "  {:>3}  {:<24} {:<24} {:>10}",
                i + 1,
                truncate(c.login.as_deref().unwrap_or("-"), 24),
                truncate(c.login_clean.as_deref().unwrap_or("-"), 24),
                c.github_id.map_or("-".to_string(), |id| id.to_string()),
            );
        }
    }
}

/// Bar proportional to `value` against the column's maximum, never shorter
/// than one mark for a non-zero value.
fn bar(value: i64, max: i64) -> String {
    if max <= 0 || value <= 0 {
        return String::new();
    }
    let len = ((value as f64 / max as f64) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(len.max(1))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_scales_to_the_maximum() {
        assert_eq!(bar(10, 10).len(), BAR_WIDTH);
        assert_eq!(bar(5, 10).len(), BAR_WIDTH / 2);
        assert_eq!(bar(0, 10), "");
    }

    #[test]
    fn tiny_nonzero_values_still_show_a_mark() {
        assert_eq!(bar(1, 10_000), "#");
    }

    #[test]
    fn degenerate_maximum_renders_nothing() {
        assert_eq!(bar(3, 0), "");
    }

    #[test]
    fn truncate_keeps_short_names_intact() {
        assert_eq!(truncate("scikit-learn", 24), "scikit-learn");
        assert_eq!(
            truncate("a-very-long-repository-name-indeed", 10),
            "a-very-lon..."
        );
    }
}
