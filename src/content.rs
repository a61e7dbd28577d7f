//! Template-based message content for each strategy.

use rand::Rng;

use crate::models::{ClientInsight, StrategyId};

/// Subject and body rendered for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpContent {
    pub subject: String,
    pub message: String,
    /// Cosmetic score in [70, 100].
    pub confidence: u8,
}

struct Template {
    subject: &'static str,
    body: &'static str,
}

fn template(id: StrategyId) -> Template {
    match id {
        StrategyId::WelcomeNewClient => Template {
            subject: "Bienvenue {name} !",
            body: "Bonjour {name},\n\n\
                   Merci pour votre première réservation. Nous sommes ravis de vous accueillir \
                   dans nos espaces. Découvrez aussi nos autres offres autour de {interest} \
                   et n'hésitez pas à nous contacter pour toute question.\n\n\
                   À très bientôt !",
        },
        StrategyId::InactiveClientReminder => Template {
            subject: "{name}, vous nous manquez !",
            body: "Bonjour {name},\n\n\
                   Cela fait un moment que nous ne vous avons pas vu. Votre espace préféré \
                   ({interest}) vous attend : réservez dès aujourd'hui et profitez de nos \
                   nouvelles disponibilités.\n\n\
                   À très vite !",
        },
        StrategyId::HighValueClientRetention => Template {
            subject: "Une attention particulière pour vous, {name}",
            body: "Bonjour {name},\n\n\
                   En tant que client privilégié, vous bénéficiez d'un accès prioritaire \
                   et d'avantages exclusifs sur vos prochaines réservations ({interest}). \
                   Votre conseiller reste à votre disposition.\n\n\
                   Merci pour votre fidélité.",
        },
        StrategyId::CancellationFollowup => Template {
            subject: "Suite à votre annulation",
            body: "Bonjour {name},\n\n\
                   Nous avons bien pris en compte l'annulation de votre réservation. \
                   Si quelque chose n'a pas répondu à vos attentes, dites-le nous : nous \
                   serions heureux de vous proposer une nouvelle date pour {interest}.\n\n\
                   Cordialement.",
        },
        StrategyId::SeasonalPromotion => Template {
            subject: "Nos offres du moment",
            body: "Bonjour {name},\n\n\
                   Profitez de nos offres de saison sur {interest} et sur l'ensemble de nos \
                   espaces de travail. Les places sont limitées, réservez sans attendre.\n\n\
                   L'équipe de réservation",
        },
    }
}

fn render(template: &str, name: &str, interest: &str) -> String {
    template.replace("{name}", name).replace("{interest}", interest)
}

/// Renders the strategy's template for the given client.
pub fn generate_content(strategy: StrategyId, insight: &ClientInsight) -> FollowUpContent {
    let name = insight.client_name.as_deref().unwrap_or("cher client");
    let interest = insight
        .interests
        .iter()
        .next()
        .map(String::as_str)
        .unwrap_or("nos espaces");

    let template = template(strategy);
    FollowUpContent {
        subject: render(template.subject, name, interest),
        message: render(template.body, name, interest),
        confidence: rand::thread_rng().gen_range(70..=100),
    }
}
