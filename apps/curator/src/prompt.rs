use curator_types::Paper;

pub const DEFAULT_PROFILE: &str = "\
Applied machine learning researcher working on large language models.
Main interests: alignment and preference learning (RLHF, DPO), retrieval-augmented
generation, reasoning and tool use in agents, and rigorous evaluation of LLM systems.
Prefers papers with reproducible methodology, ablations and released code over
position papers or narrow benchmark tweaks.";

pub fn evaluation_prompt(profile: &str, paper: &Paper) -> String {
    let mut s = String::new();
    s.push_str("You are screening new arXiv papers for one reader.\n\n");
    s.push_str("Reader profile:\n");
    s.push_str(profile.trim());
    s.push_str("\n\nPaper:\n");
    s.push_str(&format!("Title: {}\n", paper.title));
    if !paper.authors.is_empty() {
        s.push_str(&format!("Authors: {}\n", paper.authors_joined()));
    }
    s.push_str(&format!("Abstract: {}\n", paper.abstract_text.as_deref().unwrap_or("(none)")));
    s.push_str("\nRate how relevant this paper is to the reader on a 0-10 scale.\n");
    s.push_str("Answer with exactly one line in this form:\n");
    s.push_str("Score: <0-10>/10 - <one or two sentences of reasoning>\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_profile_and_paper() {
        let mut p = Paper::new("http://arxiv.org/abs/2501.00001v1", "Sparse RLHF");
        p.authors = vec!["A. One".into(), "B. Two".into()];
        p.abstract_text = Some("We study reward sparsity.".into());
        let text = evaluation_prompt("Likes alignment.", &p);
        assert!(text.contains("Likes alignment."));
        assert!(text.contains("Title: Sparse RLHF"));
        assert!(text.contains("Authors: A. One, B. Two"));
        assert!(text.contains("Abstract: We study reward sparsity."));
        assert!(text.contains("Score: <0-10>/10"));
    }
}
