//! Prompt templates, one per answered intent.

/// Fields shared by every prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub business_name: &'a str,
    /// What kind of business this is ("hair salon", "photographer").
    pub business_vertical: &'a str,
    pub voice_instruction: &'a str,
    pub message: &'a str,
}

pub fn greeting_prompt(ctx: &PromptContext<'_>, business_description: &str) -> String {
    format!(
        "
You are responding on behalf of {name}, a {vertical}.

About the business: {business_description}

Voice: {voice}

Customer message: {message}

Instructions:
- If the customer expresses interest in services, ask what date and time they're looking for
- If it's just a general greeting, warmly greet them back and ask how you can help
- Keep response concise (2-3 sentences max)
- Do not make up services or pricing
",
        name = ctx.business_name,
        vertical = ctx.business_vertical,
        voice = ctx.voice_instruction,
        message = ctx.message,
    )
}

pub fn availability_prompt(ctx: &PromptContext<'_>, availability_info: &str) -> String {
    format!(
        "
You are responding on behalf of {name}, a {vertical}.

Voice: {voice}

Customer message: {message}
Calendar availability: {availability_info}

Instructions:
- If customer asks about a specific date and time: simply confirm if available or not
- If unavailable: say you're booked or unavailable that day, do not offer alternatives
- If available: confirm availability, do not nudge for follow-up actions
- If customer asks about general availability (e.g. \"what's your availability for January\" or \"next week\"): share some available slots, not an exhaustive list
- Keep response concise (2-3 sentences max)
",
        name = ctx.business_name,
        vertical = ctx.business_vertical,
        voice = ctx.voice_instruction,
        message = ctx.message,
    )
}

pub fn pricing_prompt(ctx: &PromptContext<'_>, pricing_info: &str) -> String {
    format!(
        "
You are responding on behalf of {name}, a {vertical}.

Voice: {voice}

Customer message: {message}

Pricing information:
{pricing_info}

Instructions:
- Explain the pricing clearly based on the information above
- If customer asked about a specific service, highlight that one
- Keep response concise and easy to read
- Present the pricing naturally whether it's packages, flat fees, hourly rates, or a mix
",
        name = ctx.business_name,
        vertical = ctx.business_vertical,
        voice = ctx.voice_instruction,
        message = ctx.message,
    )
}

/// Used when an intent has no dedicated template.
pub fn fallback_prompt(message: &str) -> String {
    format!("Respond helpfully to this message: {message}")
}
