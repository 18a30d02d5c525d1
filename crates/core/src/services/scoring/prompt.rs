/// Build the single user prompt asking the model to rate `code` against `description`.
///
/// The model is told to answer with the score alone on the first line and its
/// explanation on the following lines.
pub fn build_prompt(description: &str, code: &str) -> String {
    format!(
        "You have been asked to review C decompiled code from Ghidra and identify the following \
         '{description}'. Return a score between 0 and 10, where 0 means there is no indication, \
         1 to 2 means there is something related, 3 to 4 means there is a degree of evidence, \
         5 to 6 means that there is more evidence, and 7 to 10 means there is significant \
         evidence. You should be certain that the code meets these scores. Format your response \
         as a single number score, followed by a new line, followed by your explanation. \n \
         Code: \n {}",
        code.trim()
    )
}
