use matcher_protocol::RoleTag;

/// Derives a coarse role category from free text.
///
/// Used at build time to tag postings and at query time to tag resumes, so
/// both sides of a filtered search agree on what the categories mean.
pub trait RoleClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Option<RoleTag>;
}

const FULLSTACK_KEYWORDS: &[&str] = &[
    "full stack",
    "full-stack",
    "react",
    "angular",
    "vue",
    "spring boot",
    "node",
    "express",
    "typescript",
    "javascript",
    "java",
    "frontend",
    "backend",
    "web developer",
    "software engineer",
    "developer",
];

const DEVOPS_KEYWORDS: &[&str] = &[
    "devops",
    "sre",
    "site reliability",
    "terraform",
    "ansible",
    "jenkins",
    "kubernetes",
    "eks",
    "helm",
    "argo",
    "ci/cd",
    "docker",
    "infrastructure",
    "platform engineer",
    "cloud engineer",
    "aws",
    "azure",
    "gcp",
];

/// Keyword-count classifier with a strict dominance rule.
///
/// A category wins only when its keyword hits are more than double the other
/// category's. Anything less decisive stays untagged, which keeps mixed
/// profiles eligible for every posting instead of pinning them to a guess.
#[derive(Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RoleClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Option<RoleTag> {
        let lowered = text.to_lowercase();
        let fullstack = count_hits(&lowered, FULLSTACK_KEYWORDS);
        let devops = count_hits(&lowered, DEVOPS_KEYWORDS);

        if fullstack == 0 && devops == 0 {
            return None;
        }
        if fullstack > devops * 2 {
            Some(RoleTag::Fullstack)
        } else if devops > fullstack * 2 {
            Some(RoleTag::Devops)
        } else {
            None
        }
    }
}

fn count_hits(lowered: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| lowered.contains(*k)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn classify(text: &str) -> Option<RoleTag> {
        KeywordClassifier::new().classify(text)
    }

    #[test]
    fn clear_fullstack_text_is_tagged() {
        let text = "Frontend and backend work with React, TypeScript and Node";
        assert_eq!(classify(text), Some(RoleTag::Fullstack));
    }

    #[test]
    fn clear_devops_text_is_tagged() {
        let text = "SRE role: Kubernetes, Terraform, Helm and CI/CD pipelines";
        assert_eq!(classify(text), Some(RoleTag::Devops));
    }

    #[test]
    fn no_keywords_means_untagged() {
        assert_eq!(classify("Accountant with a CPA license"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn mixed_text_without_dominance_stays_untagged() {
        // Three fullstack hits against two devops hits: neither clears the 2x bar.
        let text = "React and TypeScript frontend, deployed on Kubernetes with Docker";
        assert_eq!(classify(text), None);
    }

    #[test]
    fn dominance_must_be_strict() {
        // Two fullstack hits against one devops hit is not more than double.
        let text = "React and TypeScript, some Docker";
        assert_eq!(classify(text), None);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            classify("KUBERNETES TERRAFORM ANSIBLE"),
            Some(RoleTag::Devops)
        );
    }
}
