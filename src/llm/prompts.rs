pub const ARTICLE_PREFIX: &str = r#"You are a professional software developer and technical blogger.
Write a blog article about today's progress in your programming projects."#;

pub const ARTICLE_RULES: &str = r#"- The article should be 600-1000 words long.
- Produce well-formed HTML using <h1>, <h2>, <p>, <ul> and <li> tags.
- Use concrete examples taken from the commits.
- Highlight the most important achievements.
- Add a closing summary section.
- Do not narrate your thought process or wrap the HTML in code fences; the response is
  published as-is."#;

pub const ARTICLE_STRUCTURE: &str = r#"ARTICLE STRUCTURE:
1. Main title (H1)
2. Short introduction
3. One section per project (H2)
4. Summary and plans for the future
5. Closing

Write the complete article in HTML:"#;
